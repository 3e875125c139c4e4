//! Mesh text protocol parser
//!
//! Both client populations speak the same ad hoc text grammar:
//!
//! ```text
//! message        := segment*
//! segment        := sensor_segment | broadcast_segment
//! sensor_segment := "sensor-update" pair*
//! pair           := '"' name '"' WS value
//! value          := '"' chars* '"' | digit+
//! broadcast_segment := "broadcast" text_until_next_keyword
//! ```
//!
//! A payload is tokenized into double-quoted strings and bare words before
//! any keyword is recognized, so the words `sensor-update` and `broadcast`
//! only act as segment keywords when they appear *outside* quotes. A quoted
//! sensor value containing the word `broadcast` is just a value.
//!
//! The snapshot triggers `send-vars` and `peer-name anonymous` (the Scratch
//! 1.4 join handshake) are matched as substrings of the whole payload, but
//! only when the payload carries no segment at all: segment keywords take
//! precedence, mirroring the first-match dispatch of the original protocol.

/// Keyword opening a sensor-update segment.
pub const KW_SENSOR_UPDATE: &str = "sensor-update";
/// Keyword opening a broadcast segment.
pub const KW_BROADCAST: &str = "broadcast";
/// Snapshot request trigger.
pub const KW_SEND_VARS: &str = "send-vars";
/// Join handshake of a Scratch 1.4 client, also answered with a snapshot.
pub const KW_PEER_NAME_ANONYMOUS: &str = "peer-name anonymous";

/// One parsed protocol event, in textual order of its segment keyword.
///
/// Sensor values carry their raw wire form: a quoted string keeps its
/// quotes, a bare integer literal stays bare. Relaying and snapshot
/// rendering reuse the literal unchanged, so re-emitted lines stay valid
/// Mesh messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// Named variable updates: ordered `(name, value)` pairs. May be empty
    /// when the segment carried no parseable pair (a logged no-op).
    SensorUpdate { pairs: Vec<(String, String)> },
    /// Fire-once notifications: ordered non-empty trimmed names.
    Broadcast { names: Vec<String> },
    /// Replay the whole store to the requesting client.
    SnapshotRequest,
    /// Nothing recognizable; logged and otherwise ignored.
    Unrecognized { raw: String },
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    /// Byte offset of the token's first character (the opening quote for a
    /// quoted token).
    start: usize,
    /// Byte offset one past the token's last character.
    end: usize,
    kind: TokenKind<'a>,
}

#[derive(Debug, Clone, Copy)]
enum TokenKind<'a> {
    /// Whitespace-delimited bare word.
    Word(&'a str),
    /// Double-quoted string; holds the interior without the quotes.
    Quoted(&'a str),
}

impl Token<'_> {
    fn is_keyword(&self) -> bool {
        matches!(self.kind, TokenKind::Word(w) if w == KW_SENSOR_UPDATE || w == KW_BROADCAST)
    }
}

/// Split a payload into quoted strings and bare words with byte offsets.
///
/// All delimiters are ASCII, so scanning bytes never splits a multi-byte
/// UTF-8 character. An unterminated quote runs to the end of the payload.
fn tokenize(raw: &str) -> Vec<Token<'_>> {
    let bytes = raw.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
        } else if bytes[i] == b'"' {
            let interior_start = i + 1;
            let (interior_end, end) = match raw[interior_start..].find('"') {
                Some(off) => (interior_start + off, interior_start + off + 1),
                None => (raw.len(), raw.len()),
            };
            tokens.push(Token {
                start: i,
                end,
                kind: TokenKind::Quoted(&raw[interior_start..interior_end]),
            });
            i = end;
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'"' {
                i += 1;
            }
            tokens.push(Token {
                start,
                end: i,
                kind: TokenKind::Word(&raw[start..i]),
            });
        }
    }
    tokens
}

/// Index of the next segment keyword at or after `from`.
fn next_keyword(tokens: &[Token], from: usize) -> usize {
    tokens[from..]
        .iter()
        .position(Token::is_keyword)
        .map(|p| from + p)
        .unwrap_or(tokens.len())
}

/// The raw wire form of a value token, or `None` if the token cannot be a
/// value (values are quoted strings or bare digit runs).
fn value_literal(raw: &str, token: &Token) -> Option<String> {
    match token.kind {
        TokenKind::Quoted(_) => Some(raw[token.start..token.end].to_string()),
        TokenKind::Word(w) if !w.is_empty() && w.bytes().all(|b| b.is_ascii_digit()) => {
            Some(w.to_string())
        }
        _ => None,
    }
}

/// Extract `"name" value` pairs from a sensor segment by repeated matching.
/// Tokens that do not start a pair are skipped.
fn parse_pairs(raw: &str, tokens: &[Token]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if let TokenKind::Quoted(name) = tokens[i].kind {
            if !name.is_empty() {
                if let Some(value) = tokens.get(i + 1).and_then(|t| value_literal(raw, t)) {
                    pairs.push((name.to_string(), value));
                    i += 2;
                    continue;
                }
            }
        }
        i += 1;
    }
    pairs
}

/// Parse one payload into zero or more protocol events.
///
/// Segments are emitted in the textual order of their keywords. Text before
/// the first keyword belongs to no segment and is dropped. A payload with no
/// segment is a [`MeshEvent::SnapshotRequest`] if it contains a snapshot
/// trigger, otherwise a single [`MeshEvent::Unrecognized`].
pub fn parse(raw: &str) -> Vec<MeshEvent> {
    let tokens = tokenize(raw);
    let mut events: Vec<MeshEvent> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::Word(w) if w == KW_SENSOR_UPDATE => {
                let end = next_keyword(&tokens, i + 1);
                events.push(MeshEvent::SensorUpdate {
                    pairs: parse_pairs(raw, &tokens[i + 1..end]),
                });
                i = end;
            }
            TokenKind::Word(w) if w == KW_BROADCAST => {
                let end = next_keyword(&tokens, i + 1);
                // The broadcast name is the raw text between this keyword
                // and the next one, preserving interior spacing verbatim.
                let frag_end = tokens
                    .get(end)
                    .map(|t| t.start)
                    .unwrap_or(raw.len());
                let name = raw[tokens[i].end..frag_end].trim();
                match events.last_mut() {
                    // A recurring broadcast keyword extends the running
                    // broadcast segment.
                    Some(MeshEvent::Broadcast { names }) => {
                        if !name.is_empty() {
                            names.push(name.to_string());
                        }
                    }
                    _ => {
                        let names = if name.is_empty() {
                            Vec::new()
                        } else {
                            vec![name.to_string()]
                        };
                        events.push(MeshEvent::Broadcast { names });
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    if events.is_empty() {
        if raw.contains(KW_SEND_VARS) || raw.contains(KW_PEER_NAME_ANONYMOUS) {
            return vec![MeshEvent::SnapshotRequest];
        }
        return vec![MeshEvent::Unrecognized {
            raw: raw.to_string(),
        }];
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(pairs: &[(&str, &str)]) -> MeshEvent {
        MeshEvent::SensorUpdate {
            pairs: pairs
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn broadcast(names: &[&str]) -> MeshEvent {
        MeshEvent::Broadcast {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_integer_pair() {
        assert_eq!(
            parse(r#"sensor-update "score" 5"#),
            vec![sensor(&[("score", "5")])]
        );
    }

    #[test]
    fn test_multiple_pairs_in_order() {
        assert_eq!(
            parse(r#"sensor-update "x" 1 "y" 2"#),
            vec![sensor(&[("x", "1"), ("y", "2")])]
        );
    }

    #[test]
    fn test_quoted_value_keeps_quotes_and_spaces() {
        assert_eq!(
            parse(r#"sensor-update "greeting" "hello world""#),
            vec![sensor(&[("greeting", "\"hello world\"")])]
        );
    }

    #[test]
    fn test_sensor_then_broadcast() {
        assert_eq!(
            parse(r#"sensor-update "score" 5 broadcast win"#),
            vec![sensor(&[("score", "5")]), broadcast(&["win"])]
        );
    }

    #[test]
    fn test_broadcast_then_sensor_textual_order() {
        assert_eq!(
            parse(r#"broadcast go sensor-update "a" 1"#),
            vec![broadcast(&["go"]), sensor(&[("a", "1")])]
        );
    }

    #[test]
    fn test_recurring_broadcast_keyword_splits_names() {
        assert_eq!(
            parse("broadcast one broadcast two"),
            vec![broadcast(&["one", "two"])]
        );
    }

    #[test]
    fn test_broadcast_name_preserves_interior_spacing() {
        assert_eq!(
            parse("broadcast  level  up "),
            vec![broadcast(&["level  up"])]
        );
    }

    #[test]
    fn test_broadcast_inside_quoted_value_does_not_split() {
        assert_eq!(
            parse(r#"sensor-update "msg" "please broadcast this""#),
            vec![sensor(&[("msg", "\"please broadcast this\"")])]
        );
    }

    #[test]
    fn test_bare_broadcast_keyword_yields_no_names() {
        assert_eq!(parse("broadcast"), vec![broadcast(&[])]);
        assert_eq!(parse("broadcast broadcast two"), vec![broadcast(&["two"])]);
    }

    #[test]
    fn test_sensor_segment_with_no_pairs() {
        assert_eq!(parse("sensor-update garbage here"), vec![sensor(&[])]);
        // An unquoted non-digit word is not a value.
        assert_eq!(parse(r#"sensor-update "x" abc"#), vec![sensor(&[])]);
    }

    #[test]
    fn test_send_vars_triggers_snapshot() {
        assert_eq!(parse("send-vars"), vec![MeshEvent::SnapshotRequest]);
        assert_eq!(parse("xx send-vars yy"), vec![MeshEvent::SnapshotRequest]);
    }

    #[test]
    fn test_peer_name_anonymous_triggers_snapshot() {
        assert_eq!(
            parse("peer-name anonymous"),
            vec![MeshEvent::SnapshotRequest]
        );
    }

    #[test]
    fn test_segment_keyword_takes_precedence_over_snapshot() {
        assert_eq!(
            parse(r#"sensor-update "x" 1 send-vars"#),
            vec![sensor(&[("x", "1")])]
        );
    }

    #[test]
    fn test_unrecognized_payload() {
        assert_eq!(
            parse("hello there"),
            vec![MeshEvent::Unrecognized {
                raw: "hello there".to_string()
            }]
        );
        assert_eq!(
            parse(""),
            vec![MeshEvent::Unrecognized {
                raw: String::new()
            }]
        );
    }

    #[test]
    fn test_text_before_first_keyword_is_dropped() {
        assert_eq!(
            parse(r#"noise sensor-update "x" 1"#),
            vec![sensor(&[("x", "1")])]
        );
    }
}
