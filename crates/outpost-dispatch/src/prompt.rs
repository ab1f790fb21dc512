use outpost_store::types::Message;

/// Escape `&`, `<`, `>`, `"` for embedding in the XML-ish worker prompt.
/// Order matters: `&` must go first or the other replacements double-escape.
pub fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One `<messages>` container with a child `<message>` per entry, in the
/// order given. Callers are expected to have already filtered to the
/// messages strictly newer than `lastAgentTimestamp[F]`.
pub fn build_messages_prompt(messages: &[Message]) -> String {
    let mut out = String::from("<messages>\n");
    for m in messages {
        out.push_str(&format!(
            "  <message sender=\"{}\" time=\"{}\">{}</message>\n",
            xml_escape(&m.sender_name),
            xml_escape(&m.timestamp),
            xml_escape(&m.content),
        ));
    }
    out.push_str("</messages>");
    out
}

/// A minimal prompt for an inbound reaction event.
pub fn build_reaction_prompt(reactor: &str, emoji: &str, target_message_id: i64) -> String {
    format!(
        "<reaction reactor=\"{}\" emoji=\"{}\" target_message_id=\"{}\"/>",
        xml_escape(reactor),
        xml_escape(emoji),
        target_message_id,
    )
}
