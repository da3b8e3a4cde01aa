//! Message formatting utilities for client display.

use hiroba_shared::protocol::HistoryRecord;

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the roster and history received right after joining a group
    ///
    /// # Arguments
    ///
    /// * `group` - The group that was joined
    /// * `members` - Other members already in the group
    /// * `history` - Messages stored for the group, oldest first
    /// * `me` - The current user's name (listed first, marked as "me")
    pub fn format_group_joined(
        group: &str,
        members: &[String],
        history: &[HistoryRecord],
        me: &str,
    ) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{}\n", RULE));
        output.push_str(&format!("Group: {}\n", group));
        output.push_str("Members:\n");
        output.push_str(&format!("{} (me)\n", me));
        for member in members {
            output.push_str(&format!("{}\n", member));
        }

        if history.is_empty() {
            output.push_str("(No messages yet)\n");
        } else {
            output.push_str(&format!("{}\n", THIN_RULE));
            for record in history {
                output.push_str(&format!(
                    "[{}] @{}: {}\n",
                    record.time, record.sender, record.text
                ));
            }
        }

        output.push_str(&format!("{}\n", RULE));
        output
    }

    pub fn format_user_joined(username: &str) -> String {
        format!("\n+ {} joined\n", username)
    }

    pub fn format_user_left(username: &str) -> String {
        format!("\n- {} left\n", username)
    }

    /// Format a chat message relayed from another member
    pub fn format_chat_message(sender: &str, text: &str, time: &str) -> String {
        format!(
            "\n\n{rule}\n@{}: {}\nsent at {}\n{rule}\n",
            sender,
            text,
            time,
            rule = THIN_RULE
        )
    }

    pub fn format_sent_confirmation(time: &str) -> String {
        format!("sent at {}\n", time)
    }

    /// Format a packet the client does not know how to display
    pub fn format_raw_packet(raw: &str) -> String {
        format!("\n← Received: {}\n", raw)
    }
}
