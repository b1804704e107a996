//! Indicator payloads
//!
//! Strict parsers for the structured payloads of `+CIND`, `AT+BIA`,
//! `AT+CMER` and `+CIEV`. Unlike the top level [`parse`](super::parse),
//! these reject anything that is not well formed.

use super::AtError;
use crate::constants::{CMER_PARAMETERS, INDICATOR_KINDS, MAX_INDICATORS};
use heapless::{String, Vec};

/// AG indicators known to the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorKind {
    /// Indicator name not recognised
    Unknown,
    /// `service`: network service availability
    Service,
    /// `call`: call in progress
    Call,
    /// `callsetup`: call setup progress
    CallSetup,
    /// `callheld`: held call state
    CallHeld,
    /// `signal`: signal strength
    Signal,
    /// `roam`: roaming
    Roam,
    /// `battchg`: battery charge level
    BattChg,
}

impl IndicatorKind {
    /// Known indicators in the order an AG advertises them
    pub const KNOWN: [Self; INDICATOR_KINDS] = [
        Self::Service,
        Self::Call,
        Self::CallSetup,
        Self::CallHeld,
        Self::Signal,
        Self::Roam,
        Self::BattChg,
    ];

    /// Look up an indicator by its exact (case-sensitive) name
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|kind| kind.name() == name)
            .unwrap_or(Self::Unknown)
    }

    /// Name used in `+CIND` test responses
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Service => "service",
            Self::Call => "call",
            Self::CallSetup => "callsetup",
            Self::CallHeld => "callheld",
            Self::Signal => "signal",
            Self::Roam => "roam",
            Self::BattChg => "battchg",
        }
    }

    /// Inclusive value range
    #[must_use]
    pub const fn range(self) -> (u8, u8) {
        match self {
            Self::Unknown => (0, 0),
            Self::Service | Self::Call | Self::Roam => (0, 1),
            Self::CallSetup => (0, 3),
            Self::CallHeld => (0, 2),
            Self::Signal | Self::BattChg => (0, 5),
        }
    }
}

/// Position to indicator mapping, as advertised by `+CIND: (...)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorMap {
    kinds: Vec<IndicatorKind, MAX_INDICATORS>,
}

impl IndicatorMap {
    /// Empty map
    #[must_use]
    pub const fn new() -> Self {
        Self { kinds: Vec::new() }
    }

    /// The map an AG built by this crate advertises
    #[must_use]
    pub fn standard() -> Self {
        let mut kinds = Vec::new();
        for kind in IndicatorKind::KNOWN {
            kinds.push(kind).ok();
        }
        Self { kinds }
    }

    /// Number of indicators in the map
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the map has no indicators
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Indicator at a zero-based position
    #[must_use]
    pub fn get(&self, position: usize) -> Option<IndicatorKind> {
        self.kinds.get(position).copied()
    }

    /// Zero-based position of an indicator
    #[must_use]
    pub fn position(&self, kind: IndicatorKind) -> Option<usize> {
        self.kinds.iter().position(|k| *k == kind)
    }

    /// Indicators in wire order
    pub fn iter(&self) -> impl Iterator<Item = IndicatorKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Render the `+CIND` test response payload
    ///
    /// Unknown entries are skipped since they have no name.
    ///
    /// # Errors
    /// Returns `AtError::BufferTooSmall` if the payload does not fit
    pub fn render<const N: usize>(&self, out: &mut String<N>) -> Result<(), AtError> {
        use core::fmt::Write;

        out.clear();
        let mut first = true;
        for kind in self.iter().filter(|k| *k != IndicatorKind::Unknown) {
            let (low, high) = kind.range();
            let separator = if first { "" } else { "," };
            write!(out, "{separator}(\"{}\",({low},{high}))", kind.name())
                .map_err(|_| AtError::BufferTooSmall)?;
            first = false;
        }
        Ok(())
    }
}

/// Per-indicator reporting switches set by `AT+BIA`
///
/// Positions follow [`IndicatorKind::KNOWN`]. Every indicator starts
/// enabled; positions past the mask are always enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorMask {
    enabled: [bool; INDICATOR_KINDS],
}

impl Default for IndicatorMask {
    fn default() -> Self {
        Self {
            enabled: [true; INDICATOR_KINDS],
        }
    }
}

impl IndicatorMask {
    /// Mask from per-position flags
    #[must_use]
    pub const fn from_array(enabled: [bool; INDICATOR_KINDS]) -> Self {
        Self { enabled }
    }

    /// Whether the indicator at `position` is reported; positions past the mask are
    #[must_use]
    pub fn is_enabled(&self, position: usize) -> bool {
        self.enabled.get(position).copied().unwrap_or(true)
    }

    /// Per-position flags
    #[must_use]
    pub const fn as_array(&self) -> [bool; INDICATOR_KINDS] {
        self.enabled
    }
}

/// `AT+CMER` parameters: mode, keypad, display, indicator reporting, buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventReporting {
    /// Event reporting mode, `3` forwards events
    pub mode: u32,
    /// Keypad event reporting
    pub keypad: u32,
    /// Display event reporting
    pub display: u32,
    /// Indicator event reporting, `1` enables `+CIEV`
    pub indicators: u32,
    /// Buffered result code handling
    pub buffer: u32,
}

impl EventReporting {
    /// Settings from the five `AT+CMER` values in order
    #[must_use]
    pub const fn from_array(values: [u32; CMER_PARAMETERS]) -> Self {
        Self {
            mode: values[0],
            keypad: values[1],
            display: values[2],
            indicators: values[3],
            buffer: values[4],
        }
    }

    /// The five `AT+CMER` values in order
    #[must_use]
    pub const fn as_array(&self) -> [u32; CMER_PARAMETERS] {
        [
            self.mode,
            self.keypad,
            self.display,
            self.indicators,
            self.buffer,
        ]
    }

    /// Whether `+CIEV` unsolicited results should be sent
    #[must_use]
    pub const fn indicators_enabled(&self) -> bool {
        self.mode == 3 && self.indicators == 1
    }
}

/// Parse a `+CIND` test response payload
///
/// Expects a comma separated list of `("name",(range))` groups. Names are
/// matched case-sensitively; unrecognised names map to
/// [`IndicatorKind::Unknown`] but keep their position.
///
/// # Errors
/// Returns `AtError::MalformedPayload` on unbalanced or missing delimiters,
/// or when more than `MAX_INDICATORS` groups are listed
pub fn parse_cind(text: &str) -> Result<IndicatorMap, AtError> {
    let mut map = IndicatorMap::new();
    let mut cursor = Cursor::new(text);

    loop {
        cursor.skip_blank();
        cursor.expect(b'(')?;
        cursor.skip_blank();
        cursor.expect(b'"')?;
        let name = cursor.take_until(b'"')?;
        cursor.skip_blank();
        cursor.expect(b',')?;
        cursor.skip_blank();
        cursor.expect(b'(')?;
        let range = cursor.take_until(b')')?;
        if !range
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b',' | b'-' | b' '))
        {
            return Err(AtError::MalformedPayload);
        }
        cursor.skip_blank();
        cursor.expect(b')')?;

        map.kinds
            .push(IndicatorKind::from_name(name))
            .map_err(|_| AtError::MalformedPayload)?;

        cursor.skip_blank();
        if cursor.is_done() {
            return Ok(map);
        }
        cursor.expect(b',')?;
    }
}

/// Apply an `AT+BIA` payload to `mask`
///
/// Tokens are positional: `1` enables, `0` disables and an empty token
/// leaves the current value. The mask is only changed when the whole
/// payload is valid.
///
/// # Errors
/// Returns `AtError::MalformedPayload` for a token other than `0`, `1` or
/// empty, or when more than `INDICATOR_KINDS` tokens are given
pub fn parse_bia(text: &str, mask: &mut IndicatorMask) -> Result<(), AtError> {
    let text = text.trim_matches(|c| matches!(c, ' ' | '\r' | '\n'));
    if text.is_empty() {
        return Ok(());
    }

    let mut updates = [None; INDICATOR_KINDS];
    for (position, token) in text.split(',').enumerate() {
        let slot = updates
            .get_mut(position)
            .ok_or(AtError::MalformedPayload)?;
        *slot = match token.trim() {
            "" => None,
            "0" => Some(false),
            "1" => Some(true),
            _ => return Err(AtError::MalformedPayload),
        };
    }

    for (enabled, update) in mask.enabled.iter_mut().zip(updates) {
        if let Some(value) = update {
            *enabled = value;
        }
    }
    Ok(())
}

/// Parse an `AT+CMER` payload
///
/// Values past the fifth are ignored.
///
/// # Errors
/// Returns `AtError::MalformedPayload` when fewer than five values are given
/// or a value is not a non-negative integer
pub fn parse_cmer(text: &str) -> Result<EventReporting, AtError> {
    let mut values = [0u32; CMER_PARAMETERS];
    let mut tokens = text.trim().split(',');
    for value in &mut values {
        let token = tokens.next().ok_or(AtError::MalformedPayload)?.trim();
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AtError::MalformedPayload);
        }
        *value = token.parse().map_err(|_| AtError::MalformedPayload)?;
    }
    Ok(EventReporting::from_array(values))
}

/// Parse a `+CIEV` payload into a zero-based position and value
///
/// `+CIEV` indexes are one-based and only meaningful once the indicator map
/// is known, so an empty map is rejected.
///
/// # Errors
/// Returns `AtError::MalformedPayload` if the payload is not `index,value`,
/// the index is outside the map, or the map is empty
pub fn parse_indicator_event(
    text: &str,
    map: &IndicatorMap,
) -> Result<(usize, IndicatorKind, u8), AtError> {
    if map.is_empty() {
        return Err(AtError::MalformedPayload);
    }
    let (index, value) = text
        .trim()
        .split_once(',')
        .ok_or(AtError::MalformedPayload)?;
    let index: usize = index
        .trim()
        .parse()
        .map_err(|_| AtError::MalformedPayload)?;
    let value: u8 = value
        .trim()
        .parse()
        .map_err(|_| AtError::MalformedPayload)?;
    let position = index.checked_sub(1).ok_or(AtError::MalformedPayload)?;
    let kind = map.get(position).ok_or(AtError::MalformedPayload)?;
    Ok((position, kind, value))
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_blank(&mut self) {
        let bytes = self.text.as_bytes();
        while matches!(bytes.get(self.pos), Some(b' ' | b'\r' | b'\n' | b'\t')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), AtError> {
        if self.text.as_bytes().get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(AtError::MalformedPayload)
        }
    }

    /// Take text up to `byte` and step over it
    fn take_until(&mut self, byte: u8) -> Result<&'a str, AtError> {
        let rest = &self.text.as_bytes()[self.pos..];
        let len = rest
            .iter()
            .position(|b| *b == byte)
            .ok_or(AtError::MalformedPayload)?;
        let taken = &self.text[self.pos..self.pos + len];
        self.pos += len + 1;
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIND_STANDARD: &str = "(\"service\",(0,1)),(\"call\",(0,1)),(\"callsetup\",(0,3)),\
        (\"callheld\",(0,2)),(\"signal\",(0,5)),(\"roam\",(0,1)),(\"battchg\",(0,5))";

    #[test]
    fn test_parse_cind_positions() {
        let map = parse_cind("(\"call\",(0,1)),(\"service\",(0,1))").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(0), Some(IndicatorKind::Call));
        assert_eq!(map.get(1), Some(IndicatorKind::Service));
        assert_eq!(map.position(IndicatorKind::Service), Some(1));
    }

    #[test]
    fn test_parse_cind_unknown_keeps_position() {
        let map = parse_cind("(\"service\",(0,1)),(\"message\",(0,1)),(\"roam\",(0,1))").unwrap();
        assert_eq!(map.get(1), Some(IndicatorKind::Unknown));
        assert_eq!(map.get(2), Some(IndicatorKind::Roam));
    }

    #[test]
    fn test_parse_cind_is_case_sensitive() {
        let map = parse_cind("(\"Service\",(0,1))").unwrap();
        assert_eq!(map.get(0), Some(IndicatorKind::Unknown));
    }

    #[test]
    fn test_parse_cind_accepts_spacing_and_dash_ranges() {
        let map = parse_cind(" (\"signal\", (0-5)) , (\"battchg\",(0-5))\r\n").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), Some(IndicatorKind::BattChg));
    }

    #[test]
    fn test_parse_cind_malformed() {
        assert_eq!(parse_cind(""), Err(AtError::MalformedPayload));
        assert_eq!(
            parse_cind("(\"service\",(0,1)"),
            Err(AtError::MalformedPayload)
        );
        assert_eq!(parse_cind("(\"service,(0,1))"), Err(AtError::MalformedPayload));
        assert_eq!(
            parse_cind("(\"service\",(0,x))"),
            Err(AtError::MalformedPayload)
        );
        assert_eq!(
            parse_cind("(\"service\",(0,1)),"),
            Err(AtError::MalformedPayload)
        );
    }

    #[test]
    fn test_parse_cind_too_many_groups() {
        let mut text: String<1024> = String::new();
        for i in 0..=MAX_INDICATORS {
            if i > 0 {
                text.push(',').unwrap();
            }
            text.push_str("(\"roam\",(0,1))").unwrap();
        }
        assert_eq!(parse_cind(&text), Err(AtError::MalformedPayload));
    }

    #[test]
    fn test_standard_map_holds_every_known_kind() {
        let map = IndicatorMap::standard();
        assert_eq!(map.len(), INDICATOR_KINDS);
        for (position, kind) in IndicatorKind::KNOWN.into_iter().enumerate() {
            assert_eq!(map.position(kind), Some(position));
        }
    }

    #[test]
    fn test_render_round_trips_through_parse() {
        let mut out: String<256> = String::new();
        IndicatorMap::standard().render(&mut out).unwrap();
        assert_eq!(out.as_str(), CIND_STANDARD);
        assert_eq!(parse_cind(&out).unwrap(), IndicatorMap::standard());
    }

    #[test]
    fn test_render_too_small() {
        let mut out: String<16> = String::new();
        assert_eq!(
            IndicatorMap::standard().render(&mut out),
            Err(AtError::BufferTooSmall)
        );
    }

    #[test]
    fn test_parse_bia_updates_positions() {
        let mut mask = IndicatorMask::from_array([false; INDICATOR_KINDS]);
        parse_bia("1,0,1", &mut mask).unwrap();
        assert_eq!(
            mask.as_array(),
            [true, false, true, false, false, false, false]
        );
    }

    #[test]
    fn test_parse_bia_empty_token_keeps_value() {
        let mut mask = IndicatorMask::default();
        parse_bia(",0,,0", &mut mask).unwrap();
        assert_eq!(mask.as_array(), [true, false, true, false, true, true, true]);
        assert!(mask.is_enabled(INDICATOR_KINDS + 3));
    }

    #[test]
    fn test_parse_bia_rejects_bad_tokens_without_mutation() {
        let mut mask = IndicatorMask::default();
        assert_eq!(parse_bia("0,2", &mut mask), Err(AtError::MalformedPayload));
        assert_eq!(mask, IndicatorMask::default());

        assert_eq!(
            parse_bia("0,0,0,0,0,0,0,0", &mut mask),
            Err(AtError::MalformedPayload)
        );
        assert_eq!(mask, IndicatorMask::default());
    }

    #[test]
    fn test_parse_cmer() {
        let reporting = parse_cmer("3,0,0,1").unwrap_err();
        assert_eq!(reporting, AtError::MalformedPayload);

        let reporting = parse_cmer("3,0,0,1,0").unwrap();
        assert_eq!(reporting.as_array(), [3, 0, 0, 1, 0]);
        assert!(reporting.indicators_enabled());

        let extra = parse_cmer("3, 0, 0, 0, 0, 9").unwrap();
        assert_eq!(extra.as_array(), [3, 0, 0, 0, 0]);
        assert!(!extra.indicators_enabled());

        assert_eq!(parse_cmer("3,0,-1,1,0"), Err(AtError::MalformedPayload));
        assert_eq!(parse_cmer("3,0,,1,0"), Err(AtError::MalformedPayload));
    }

    #[test]
    fn test_parse_indicator_event() {
        let map = IndicatorMap::standard();
        assert_eq!(
            parse_indicator_event("2,1", &map),
            Ok((1, IndicatorKind::Call, 1))
        );
        assert_eq!(
            parse_indicator_event(" 5, 3", &map),
            Ok((4, IndicatorKind::Signal, 3))
        );
        assert_eq!(
            parse_indicator_event("0,1", &map),
            Err(AtError::MalformedPayload)
        );
        assert_eq!(
            parse_indicator_event("9,1", &map),
            Err(AtError::MalformedPayload)
        );
        assert_eq!(
            parse_indicator_event("2,1", &IndicatorMap::new()),
            Err(AtError::MalformedPayload)
        );
    }
}
