//! AT Command Codec
//!
//! Hands-Free (HFP) and Headset (HSP) profiles exchange line oriented AT
//! commands over an RFCOMM channel. This module turns such lines into
//! [`AtCommand`] values and renders them back into wire text.
//!
//! ## Wire forms
//!
//! | Kind       | Rendered text            |
//! |------------|--------------------------|
//! | `Raw`      | value verbatim           |
//! | `Command`  | `AT+NAME\r`              |
//! | `Get`      | `AT+NAME?\r`             |
//! | `Set`      | `AT+NAME=VALUE\r`        |
//! | `Test`     | `AT+NAME=?\r`            |
//! | `Response` | `\r\n+NAME:VALUE\r\n`    |
//!
//! A response without a name (`OK`, `ERROR`, `RING`) renders as
//! `\r\nVALUE\r\n`.
//!
//! Top level parsing is permissive: anything that does not look like a
//! command or a response becomes a `Raw` command carrying the whole line.
//! The indicator sub-parsers in [`indicators`] are strict instead.
//!
//! ## Usage
//!
//! ```rust
//! use warbler::at::{self, AtKind};
//!
//! let command = at::parse("AT+BCS=2\r");
//! assert_eq!(command.kind(), AtKind::Set);
//! assert_eq!(command.name(), "BCS");
//! assert_eq!(command.value(), Some("2"));
//!
//! let mut buffer = heapless::String::<32>::new();
//! let text = command.render(&mut buffer).unwrap();
//! assert_eq!(text, "AT+BCS=2\r");
//! ```

pub mod indicators;

pub use indicators::{
    EventReporting, IndicatorKind, IndicatorMap, IndicatorMask, parse_bia, parse_cind,
    parse_cmer, parse_indicator_event,
};

use crate::constants::{AT_MESSAGE_CAPACITY, AT_NAME_CAPACITY, AT_VALUE_CAPACITY};
use heapless::String;

/// Bounded command name
pub type AtName = String<AT_NAME_CAPACITY>;

/// Bounded command payload
pub type AtValue = String<AT_VALUE_CAPACITY>;

/// Buffer large enough for any rendered message
pub type AtLine = String<AT_MESSAGE_CAPACITY>;

/// AT codec errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtError {
    /// A structured payload (BIA, CIND, CMER, CIEV) is not well formed
    MalformedPayload,
    /// The rendered message does not fit into the output buffer
    BufferTooSmall,
    /// The value would not parse back as the same message
    AmbiguousValue,
}

impl core::fmt::Display for AtError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MalformedPayload => write!(f, "Malformed AT command payload"),
            Self::BufferTooSmall => write!(f, "AT message exceeds buffer capacity"),
            Self::AmbiguousValue => write!(f, "AT value cannot be rendered unambiguously"),
        }
    }
}

/// Shape of an AT message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtKind {
    /// Unrecognised line, carried verbatim
    Raw,
    /// `AT+NAME`
    Command,
    /// `AT+NAME?`
    Get,
    /// `AT+NAME=VALUE`
    Set,
    /// `AT+NAME=?`
    Test,
    /// `+NAME:VALUE` or a bare result code
    Response,
}

impl AtKind {
    /// Short diagnostic label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::Command => "CMD",
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Test => "TEST",
            Self::Response => "RESP",
        }
    }

    /// Whether messages of this kind carry a value
    #[must_use]
    pub const fn has_value(self) -> bool {
        matches!(self, Self::Raw | Self::Set | Self::Response)
    }
}

impl core::fmt::Display for AtKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed or to-be-rendered AT message
///
/// The name is stored without the `+` prefix and in upper case. Names and
/// values longer than their capacity are cut at the last character that
/// fits and the command is flagged with [`AtCommand::is_truncated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    kind: AtKind,
    name: AtName,
    value: Option<AtValue>,
    truncated: bool,
}

impl AtCommand {
    fn with_parts(kind: AtKind, name: &str, value: Option<&str>) -> Self {
        let (name, name_cut) = bounded_upper(name);
        let (value, value_cut) = match value {
            // the wire form drops the space after `+NAME:`
            Some(text) if kind == AtKind::Response => {
                let (value, cut) = bounded::<AT_VALUE_CAPACITY>(text.trim_start_matches(' '));
                (Some(value), cut)
            }
            Some(text) if kind.has_value() => {
                let (value, cut) = bounded::<AT_VALUE_CAPACITY>(text);
                (Some(value), cut)
            }
            None if kind.has_value() => (Some(String::new()), false),
            _ => (None, false),
        };
        Self {
            kind,
            name,
            value,
            truncated: name_cut || value_cut,
        }
    }

    /// Unrecognised text carried verbatim
    #[must_use]
    pub fn raw(text: &str) -> Self {
        let (value, truncated) = bounded::<AT_VALUE_CAPACITY>(text);
        Self {
            kind: AtKind::Raw,
            name: String::new(),
            value: Some(value),
            truncated,
        }
    }

    /// `AT+NAME`
    #[must_use]
    pub fn command(name: &str) -> Self {
        Self::with_parts(AtKind::Command, name, None)
    }

    /// `AT+NAME?`
    #[must_use]
    pub fn get(name: &str) -> Self {
        Self::with_parts(AtKind::Get, name, None)
    }

    /// `AT+NAME=VALUE`
    #[must_use]
    pub fn set(name: &str, value: &str) -> Self {
        Self::with_parts(AtKind::Set, name, Some(value))
    }

    /// `AT+NAME=?`
    #[must_use]
    pub fn test(name: &str) -> Self {
        Self::with_parts(AtKind::Test, name, None)
    }

    /// `+NAME:VALUE`, or a bare result code when `name` is empty
    ///
    /// Leading spaces of `value` are dropped, as [`parse`] does.
    #[must_use]
    pub fn response(name: &str, value: &str) -> Self {
        Self::with_parts(AtKind::Response, name, Some(value))
    }

    /// `OK` result code
    #[must_use]
    pub fn ok() -> Self {
        Self::response("", "OK")
    }

    /// `ERROR` result code
    #[must_use]
    pub fn error() -> Self {
        Self::response("", "ERROR")
    }

    /// Message kind
    #[must_use]
    pub const fn kind(&self) -> AtKind {
        self.kind
    }

    /// Command name without the `+` prefix
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload, present for `Raw`, `Set` and `Response`
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether the name or value was cut to fit its capacity
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Check the name, ignoring case
    #[must_use]
    pub fn is(&self, kind: AtKind, name: &str) -> bool {
        self.kind == kind && self.name.eq_ignore_ascii_case(name)
    }

    /// Render into `buffer`, see [`build`]
    ///
    /// # Errors
    /// Returns `AtError::BufferTooSmall` if the message does not fit
    pub fn render<'b, const N: usize>(
        &self,
        buffer: &'b mut String<N>,
    ) -> Result<&'b str, AtError> {
        build(buffer, self.kind, &self.name, self.value.as_deref())
    }
}

/// Render an AT message into `buffer`
///
/// On success the buffer holds exactly the rendered text, including the
/// profile line terminators. If the text would not fit, the buffer is left
/// untouched and `AtError::BufferTooSmall` is returned.
///
/// # Errors
/// Returns `AtError::BufferTooSmall` if the rendered text exceeds `N` bytes,
/// and `AtError::AmbiguousValue` for a value that would parse back as a
/// different message: one holding a line terminator, a `Set` value of `?`,
/// or a bare result code that is empty or starts with `+` or `AT+`
pub fn build<'b, const N: usize>(
    buffer: &'b mut String<N>,
    kind: AtKind,
    name: &str,
    value: Option<&str>,
) -> Result<&'b str, AtError> {
    let value = value.unwrap_or("");
    let ambiguous = match kind {
        AtKind::Raw | AtKind::Command | AtKind::Get | AtKind::Test => false,
        AtKind::Set => value == "?" || value.contains(['\r', '\n']),
        AtKind::Response if name.is_empty() => {
            value.is_empty()
                || value.starts_with('+')
                || value.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("AT+"))
                || value.contains(['\r', '\n'])
        }
        AtKind::Response => value.contains(['\r', '\n']),
    };
    if ambiguous {
        return Err(AtError::AmbiguousValue);
    }

    let parts: [&str; 5] = match kind {
        AtKind::Raw => [value, "", "", "", ""],
        AtKind::Command => ["AT+", name, "\r", "", ""],
        AtKind::Get => ["AT+", name, "?\r", "", ""],
        AtKind::Set => ["AT+", name, "=", value, "\r"],
        AtKind::Test => ["AT+", name, "=?\r", "", ""],
        AtKind::Response if name.is_empty() => ["\r\n", value, "\r\n", "", ""],
        AtKind::Response => ["\r\n+", name, ":", value, "\r\n"],
    };

    let length: usize = parts.iter().map(|part| part.len()).sum();
    if length > N {
        return Err(AtError::BufferTooSmall);
    }

    buffer.clear();
    for part in parts {
        buffer
            .push_str(part)
            .map_err(|()| AtError::BufferTooSmall)?;
    }
    Ok(buffer.as_str())
}

/// Parse one AT message
///
/// Never fails: text that is neither an `AT+` command nor a response line
/// becomes [`AtKind::Raw`] carrying the whole input line.
#[must_use]
pub fn parse(text: &str) -> AtCommand {
    parse_message(text).0
}

/// Iterate over every message in an RFCOMM read buffer
#[must_use]
pub fn messages(buffer: &str) -> AtMessages<'_> {
    AtMessages { rest: buffer }
}

/// Iterator returned by [`messages`]
#[derive(Debug, Clone)]
pub struct AtMessages<'a> {
    rest: &'a str,
}

impl AtMessages<'_> {
    /// Text not consumed yet
    #[must_use]
    pub fn remainder(&self) -> &str {
        self.rest
    }
}

impl Iterator for AtMessages<'_> {
    type Item = AtCommand;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.trim_start_matches(['\r', '\n']).is_empty() {
            self.rest = "";
            return None;
        }
        let (command, rest) = parse_message(self.rest);
        self.rest = rest;
        Some(command)
    }
}

/// Parse the first message in `input`, returning it with the unconsumed text
fn parse_message(input: &str) -> (AtCommand, &str) {
    let body = input.trim_start_matches(['\r', '\n']);
    let framed = body.len() < input.len();

    let (line, consumed) = match body.find(['\r', '\n']) {
        Some(end) => {
            let bytes = body.as_bytes();
            let mut stop = end + 1;
            if bytes[end] == b'\r' && bytes.get(stop) == Some(&b'\n') {
                stop += 1;
            }
            (&body[..end], input.len() - body.len() + stop)
        }
        None => (body, input.len()),
    };
    let rest = &input[consumed..];

    let command = classify(line, framed).unwrap_or_else(|| {
        trace!("[AT] raw line ({=usize} bytes)", consumed);
        AtCommand::raw(&input[..consumed])
    });
    (command, rest)
}

fn classify(line: &str, framed: bool) -> Option<AtCommand> {
    if let Some(command) = line
        .get(..3)
        .filter(|prefix| prefix.eq_ignore_ascii_case("AT+"))
        .and_then(|_| classify_command(&line[3..]))
    {
        return Some(command);
    }

    if let Some(response) = line.strip_prefix('+') {
        if let Some((name, value)) = response.split_once(':') {
            if !name.is_empty() && name.bytes().all(is_name_byte) {
                return Some(AtCommand::response(name, value));
            }
        }
    }

    if framed && !line.is_empty() {
        return Some(AtCommand::response("", line));
    }

    None
}

fn classify_command(text: &str) -> Option<AtCommand> {
    let end = text.find(['?', '=']).unwrap_or(text.len());
    let (name, tail) = text.split_at(end);
    if name.is_empty() || !name.bytes().all(is_name_byte) {
        return None;
    }

    match tail {
        "" => Some(AtCommand::command(name)),
        "?" => Some(AtCommand::get(name)),
        "=?" => Some(AtCommand::test(name)),
        _ => tail
            .strip_prefix('=')
            .map(|value| AtCommand::set(name, value)),
    }
}

const fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'&'
}

fn bounded<const N: usize>(text: &str) -> (String<N>, bool) {
    let mut out = String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            return (out, true);
        }
    }
    (out, false)
}

fn bounded_upper(text: &str) -> (AtName, bool) {
    let mut out = AtName::new();
    for ch in text.chars() {
        if out.push(ch.to_ascii_uppercase()).is_err() {
            return (out, true);
        }
    }
    (out, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(command: &AtCommand) -> String<300> {
        let mut buffer = String::new();
        command.render(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_build_command_shapes() {
        let mut buffer: String<64> = String::new();

        assert_eq!(
            build(&mut buffer, AtKind::Command, "CLCC", None).unwrap(),
            "AT+CLCC\r"
        );
        assert_eq!(
            build(&mut buffer, AtKind::Get, "CIND", None).unwrap(),
            "AT+CIND?\r"
        );
        assert_eq!(
            build(&mut buffer, AtKind::Set, "BCS", Some("1")).unwrap(),
            "AT+BCS=1\r"
        );
        assert_eq!(
            build(&mut buffer, AtKind::Test, "CIND", None).unwrap(),
            "AT+CIND=?\r"
        );
        assert_eq!(
            build(&mut buffer, AtKind::Response, "BCS", Some("2")).unwrap(),
            "\r\n+BCS:2\r\n"
        );
        assert_eq!(
            build(&mut buffer, AtKind::Response, "", Some("OK")).unwrap(),
            "\r\nOK\r\n"
        );
        assert_eq!(
            build(&mut buffer, AtKind::Raw, "", Some("ATA\r")).unwrap(),
            "ATA\r"
        );
    }

    #[test]
    fn test_build_buffer_too_small_leaves_buffer_untouched() {
        let mut buffer: String<8> = String::try_from("keep").unwrap();
        let result = build(&mut buffer, AtKind::Set, "BRSF", Some("1023"));
        assert_eq!(result, Err(AtError::BufferTooSmall));
        assert_eq!(buffer.as_str(), "keep");

        // "AT+BCS=1\r" is exactly nine bytes
        let mut exact: String<9> = String::new();
        assert_eq!(
            build(&mut exact, AtKind::Set, "BCS", Some("1")).unwrap(),
            "AT+BCS=1\r"
        );
        let mut short: String<8> = String::new();
        assert_eq!(
            build(&mut short, AtKind::Set, "BCS", Some("1")),
            Err(AtError::BufferTooSmall)
        );
    }

    #[test]
    fn test_parse_command_shapes() {
        let command = parse("AT+CLCC\r");
        assert_eq!(command.kind(), AtKind::Command);
        assert_eq!(command.name(), "CLCC");
        assert_eq!(command.value(), None);

        let get = parse("AT+CIND?\r");
        assert_eq!(get.kind(), AtKind::Get);
        assert_eq!(get.name(), "CIND");
        assert_eq!(get.value(), None);

        let test = parse("AT+CIND=?\r");
        assert_eq!(test.kind(), AtKind::Test);
        assert_eq!(test.name(), "CIND");
        assert_eq!(test.value(), None);

        let set = parse("AT+CMER=3,0,0,1,0\r");
        assert_eq!(set.kind(), AtKind::Set);
        assert_eq!(set.name(), "CMER");
        assert_eq!(set.value(), Some("3,0,0,1,0"));
    }

    #[test]
    fn test_parse_is_case_insensitive_for_prefix_and_name() {
        let command = parse("at+bcs=1\r");
        assert_eq!(command.kind(), AtKind::Set);
        assert_eq!(command.name(), "BCS");
        assert!(command.is(AtKind::Set, "bcs"));
    }

    #[test]
    fn test_parse_responses() {
        let bcs = parse("\r\n+BCS:1\r\n");
        assert_eq!(bcs.kind(), AtKind::Response);
        assert_eq!(bcs.name(), "BCS");
        assert_eq!(bcs.value(), Some("1"));

        let spaced = parse("\r\n+CIND: 0,1,0\r\n");
        assert_eq!(spaced.value(), Some("0,1,0"));

        let ok = parse("\r\nOK\r\n");
        assert_eq!(ok, AtCommand::ok());
        assert_eq!(ok.name(), "");
    }

    #[test]
    fn test_parse_unrecognized_is_raw() {
        let raw = parse("XYZZY\r");
        assert_eq!(raw.kind(), AtKind::Raw);
        assert_eq!(raw.value(), Some("XYZZY\r"));

        assert_eq!(parse("ATA\r").kind(), AtKind::Raw);
        assert_eq!(parse("AT+\r").kind(), AtKind::Raw);
        assert_eq!(parse("AT+CIND?x\r").kind(), AtKind::Raw);
        assert_eq!(parse("").kind(), AtKind::Raw);
    }

    #[test]
    fn test_long_name_is_truncated_and_flagged() {
        let mut line: String<64> = String::try_from("AT+").unwrap();
        for _ in 0..40 {
            line.push('X').unwrap();
        }
        line.push_str("=1\r").unwrap();

        let command = parse(&line);
        assert_eq!(command.kind(), AtKind::Set);
        assert!(command.is_truncated());
        assert_eq!(command.name().len(), AT_NAME_CAPACITY);
        assert_eq!(command.value(), Some("1"));

        assert!(!parse("AT+BCS=1\r").is_truncated());
    }

    #[test]
    fn test_round_trip() {
        let commands = [
            AtCommand::command("CHUP"),
            AtCommand::get("CIND"),
            AtCommand::set("BAC", "1,2"),
            AtCommand::test("CHLD"),
            AtCommand::response("BRSF", "871"),
            AtCommand::response("", "RING"),
            AtCommand::raw("XYZZY\r"),
        ];
        for command in commands {
            let text = render(&command);
            assert_eq!(parse(&text), command, "round trip of {}", text.as_str());
        }
    }

    #[test]
    fn test_response_value_is_stored_as_parsed() {
        let command = AtCommand::response("CIND", " 0,1");
        assert_eq!(command.value(), Some("0,1"));
        assert_eq!(render(&command).as_str(), "\r\n+CIND:0,1\r\n");
        assert_eq!(parse("\r\n+CIND: 0,1\r\n"), command);
    }

    #[test]
    fn test_build_rejects_values_that_do_not_round_trip() {
        let mut buffer: String<32> = String::try_from("keep").unwrap();
        assert_eq!(
            AtCommand::set("CLIP", "?").render(&mut buffer),
            Err(AtError::AmbiguousValue)
        );
        assert_eq!(
            build(&mut buffer, AtKind::Set, "BCS", Some("1\rAT+CHUP")),
            Err(AtError::AmbiguousValue)
        );
        assert_eq!(
            build(&mut buffer, AtKind::Response, "", Some("OK\r\nRING")),
            Err(AtError::AmbiguousValue)
        );
        assert_eq!(buffer.as_str(), "keep");

        assert_eq!(
            AtCommand::response("", "+X:1").render(&mut buffer),
            Err(AtError::AmbiguousValue)
        );
        assert_eq!(buffer.as_str(), "keep");

        let mut shaped: String<32> = String::new();
        let text = AtCommand::set("CLIP", "?1").render(&mut shaped).unwrap();
        assert_eq!(text, "AT+CLIP=?1\r");
        assert_eq!(parse(text), AtCommand::set("CLIP", "?1"));
    }

    #[test]
    fn test_messages_split_buffer() {
        let mut iter = messages("\r\n+BCS:2\r\n\r\nOK\r\nAT+BCS=2\r");

        let first = iter.next().unwrap();
        assert!(first.is(AtKind::Response, "BCS"));
        assert_eq!(first.value(), Some("2"));

        assert_eq!(iter.next().unwrap(), AtCommand::ok());

        let third = iter.next().unwrap();
        assert!(third.is(AtKind::Set, "BCS"));
        assert_eq!(third.value(), Some("2"));

        assert!(iter.next().is_none());
        assert_eq!(iter.remainder(), "");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(AtKind::Raw.as_str(), "RAW");
        assert_eq!(AtKind::Command.as_str(), "CMD");
        assert_eq!(AtKind::Get.as_str(), "GET");
        assert_eq!(AtKind::Set.as_str(), "SET");
        assert_eq!(AtKind::Test.as_str(), "TEST");
        assert_eq!(AtKind::Response.as_str(), "RESP");
    }
}
