//! # Token Table
//!
//! Fixed, ordered table mapping single-byte codes to common protocol strings.
//! Codes `0..=2` are reserved for list and stream-end markers, so the first
//! entry lives at code [`FIRST_TOKEN`]. Codes above the last entry (up to
//! [`LAST_TOKEN`]) are unassigned and rejected by the decoder.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Lowest code that resolves through the table.
pub const FIRST_TOKEN: u8 = 3;

/// Highest code reserved for tokens (dictionary tags start right after).
pub const LAST_TOKEN: u8 = 235;

const STANDARD_ENTRIES: &[&str] = &[
    "200", "400", "404", "500", "501", "502", "action", "add", "after", "archive", "author",
    "available", "battery", "before", "body", "broadcast", "chat", "clear", "code",
    "composing", "contacts", "count", "create", "debug", "delete", "demote", "duplicate",
    "encoding", "error", "false", "filehash", "from", "g.us", "group", "groups_v2", "height",
    "id", "image", "in", "index", "invis", "item", "jid", "kind", "last", "leave", "live",
    "log", "media", "message", "mimetype", "missing", "modify", "name", "notification",
    "notify", "out", "owner", "participant", "paused", "picture", "played", "presence",
    "preview", "promote", "query", "raw", "read", "receipt", "received", "recipient",
    "recording", "relay", "remove", "response", "resume", "retry", "c.us", "seconds", "set",
    "size", "status", "subject", "subscribe", "t", "text", "to", "true", "type", "unarchive",
    "unavailable", "url", "user", "value", "web", "width", "mute", "read_only", "admin",
    "creator", "short", "update", "powersave", "checksum", "epoch", "block", "previous", "409",
    "replaced", "reason", "spam", "modify_tag", "message_info", "delivery", "emoji", "title",
    "description", "canonical-url", "matched-text", "star", "unstar", "media_key", "filename",
    "identity", "unread", "page", "page_count", "search", "media_message", "security",
    "call_log", "profile", "ciphertext", "invite", "gif", "vcard", "frequent", "privacy",
    "blacklist", "whitelist", "verify", "location", "document", "elapsed", "revoke_invite",
    "expiration", "unsubscribe", "disable", "vname", "old_jid", "new_jid", "announcement",
    "locked", "prop", "label", "color", "call", "offer", "call-id",
];

/// The table shared by both ends of the standard protocol.
pub static STANDARD: Lazy<TokenTable> = Lazy::new(|| TokenTable::new(STANDARD_ENTRIES));

/// Immutable code <-> string lookup.
#[derive(Debug)]
pub struct TokenTable {
    entries: &'static [&'static str],
    reverse: HashMap<&'static str, u8>,
}

impl TokenTable {
    /// Build a table whose first entry is code [`FIRST_TOKEN`].
    ///
    /// Entries that would land past [`LAST_TOKEN`] are ignored.
    pub fn new(entries: &'static [&'static str]) -> Self {
        let capacity = usize::from(LAST_TOKEN - FIRST_TOKEN) + 1;
        let entries = &entries[..entries.len().min(capacity)];

        let mut reverse = HashMap::with_capacity(entries.len());
        for (offset, token) in entries.iter().enumerate() {
            // First occurrence wins so encoding stays deterministic.
            reverse
                .entry(*token)
                .or_insert(FIRST_TOKEN + offset as u8);
        }

        Self { entries, reverse }
    }

    /// Resolve a code to its string, if the code is assigned.
    #[inline]
    pub fn lookup(&self, code: u8) -> Option<&'static str> {
        if code < FIRST_TOKEN {
            return None;
        }
        self.entries.get(usize::from(code - FIRST_TOKEN)).copied()
    }

    /// Find the code for a string, if the table has one.
    #[inline]
    pub fn code_of(&self, token: &str) -> Option<u8> {
        self.reverse.get(token).copied()
    }

    /// Number of assigned codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest assigned code.
    pub fn last_code(&self) -> Option<u8> {
        self.len()
            .checked_sub(1)
            .map(|last| FIRST_TOKEN + last as u8)
    }
}
