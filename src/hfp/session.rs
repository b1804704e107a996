//! Service level connection state machine
//!
//! [`ServiceLevel`] is owned by the control link task. Every parsed AT
//! message is fed to [`ServiceLevel::handle`], which returns the messages to
//! write back and, when something happened that the transport layer cares
//! about, a [`SessionEvent`].
//!
//! ## Audio gateway
//!
//! ```text
//! HF: AT+BRSF=<f>      AG: +BRSF:<f>, OK
//! HF: AT+BAC=1,2       AG: OK
//! HF: AT+CIND=?        AG: +CIND:("service",(0,1)),..., OK
//! HF: AT+CIND?         AG: +CIND:0,0,..., OK
//! HF: AT+CMER=3,0,0,1,0  AG: OK          → ServiceLevelConnected
//! AG: +BCS:2           HF: AT+BCS=2      → CodecSelected
//! ```
//!
//! ## Hands-free
//!
//! The same exchange from the other side: each `OK` from the AG triggers the
//! next request until event reporting is enabled.

use super::{AgFeatures, HfFeatures, HfpCodec, Role, SlcState};
use crate::at::{
    AtCommand, AtKind, AtValue, EventReporting, IndicatorKind, IndicatorMap, IndicatorMask,
    parse_bia, parse_cind, parse_cmer, parse_indicator_event,
};
use crate::constants::{
    HFP_MAX_GAIN, HSP_BUTTON_PRESS, MAX_INDICATORS, MAX_PEER_CODECS, MAX_REPLIES,
};
use core::fmt::Write;
use heapless::Vec;

/// Something the transport layer should act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEvent {
    /// Event reporting enabled, the SLC is up
    ServiceLevelConnected,
    /// Both sides agreed on a SCO codec; the transport can be acquired
    CodecSelected(HfpCodec),
    /// Speaker gain changed (`0..=15`)
    SpeakerGain(u8),
    /// Microphone gain changed (`0..=15`)
    MicrophoneGain(u8),
    /// Headset button pressed (`AT+CKPD=200`)
    ButtonPressed,
    /// An AG indicator changed (`+CIEV`)
    Indicator {
        /// Which indicator
        kind: IndicatorKind,
        /// New value
        value: u8,
    },
    /// Incoming call alert
    Ring,
}

/// Result of handling one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Messages to write back, in order
    pub replies: Vec<AtCommand, MAX_REPLIES>,
    /// Event for the transport layer
    pub event: Option<SessionEvent>,
}

impl Outcome {
    fn none() -> Self {
        Self::default()
    }

    fn reply(mut self, command: AtCommand) -> Self {
        if self.replies.push(command).is_err() {
            warn!("[SLC] reply dropped, too many replies");
        }
        self
    }

    fn ok() -> Self {
        Self::none().reply(AtCommand::ok())
    }

    fn error() -> Self {
        Self::none().reply(AtCommand::error())
    }

    fn with_event(mut self, event: SessionEvent) -> Self {
        self.event = Some(event);
        self
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLevelConfig {
    /// Local role
    pub role: Role,
    /// Features advertised in the AG role
    pub ag_features: AgFeatures,
    /// Features advertised in the HF role
    pub hf_features: HfFeatures,
    /// Whether mSBC is offered besides CVSD
    pub msbc: bool,
    /// Indicators advertised in the AG role
    pub indicators: IndicatorMap,
}

impl ServiceLevelConfig {
    /// Audio gateway with codec negotiation and the standard indicators
    #[must_use]
    pub fn audio_gateway() -> Self {
        Self {
            role: Role::AudioGateway,
            ag_features: AgFeatures(
                AgFeatures::EC_NR
                    | AgFeatures::REJECT_CALL
                    | AgFeatures::ENHANCED_CALL_STATUS
                    | AgFeatures::EXTENDED_ERROR_CODES
                    | AgFeatures::CODEC_NEGOTIATION,
            ),
            hf_features: HfFeatures::default(),
            msbc: true,
            indicators: IndicatorMap::standard(),
        }
    }

    /// Hands-free unit with remote volume and codec negotiation
    #[must_use]
    pub fn hands_free() -> Self {
        Self {
            role: Role::HandsFree,
            ag_features: AgFeatures::default(),
            hf_features: HfFeatures(
                HfFeatures::EC_NR
                    | HfFeatures::REMOTE_VOLUME
                    | HfFeatures::ENHANCED_CALL_STATUS
                    | HfFeatures::CODEC_NEGOTIATION,
            ),
            msbc: true,
            indicators: IndicatorMap::new(),
        }
    }

    /// Offer or accept mSBC wide band speech
    #[must_use]
    pub fn with_msbc(mut self, msbc: bool) -> Self {
        self.msbc = msbc;
        self
    }

    /// Set the audio gateway features
    #[must_use]
    pub fn with_ag_features(mut self, features: AgFeatures) -> Self {
        self.ag_features = features;
        self
    }

    /// Set the hands-free features
    #[must_use]
    pub fn with_hf_features(mut self, features: HfFeatures) -> Self {
        self.hf_features = features;
        self
    }

    /// Set the indicator map an audio gateway advertises
    #[must_use]
    pub fn with_indicators(mut self, indicators: IndicatorMap) -> Self {
        self.indicators = indicators;
        self
    }
}

impl Default for ServiceLevelConfig {
    fn default() -> Self {
        Self::audio_gateway()
    }
}

/// HFP/HSP service level session for one RFCOMM link
pub struct ServiceLevel {
    config: ServiceLevelConfig,
    state: SlcState,
    peer_features: u32,
    peer_codecs: Vec<HfpCodec, MAX_PEER_CODECS>,
    indicators: IndicatorMap,
    values: [u8; MAX_INDICATORS],
    mask: IndicatorMask,
    reporting: EventReporting,
    proposed: Option<HfpCodec>,
    codec: Option<HfpCodec>,
}

impl ServiceLevel {
    /// Create a disconnected session
    #[must_use]
    pub fn new(config: ServiceLevelConfig) -> Self {
        Self {
            config,
            state: SlcState::Disconnected,
            peer_features: 0,
            peer_codecs: Vec::new(),
            indicators: IndicatorMap::new(),
            values: [0; MAX_INDICATORS],
            mask: IndicatorMask::default(),
            reporting: EventReporting::default(),
            proposed: None,
            codec: None,
        }
    }

    /// RFCOMM link is up; in the HF role returns the opening `AT+BRSF`
    pub fn connect(&mut self) -> Option<AtCommand> {
        self.reset();
        self.state = SlcState::Connected;
        info!("[SLC] connected as {:?}", self.config.role);
        match self.config.role {
            Role::AudioGateway => {
                self.indicators = self.config.indicators.clone();
                None
            }
            Role::HandsFree => Some(self.request("BRSF", self.config.hf_features.0)),
        }
    }

    /// RFCOMM link went away
    pub fn disconnect(&mut self) {
        self.reset();
        info!("[SLC] disconnected");
    }

    fn reset(&mut self) {
        self.state = SlcState::Disconnected;
        self.peer_features = 0;
        self.peer_codecs.clear();
        self.indicators = IndicatorMap::new();
        self.values = [0; MAX_INDICATORS];
        self.mask = IndicatorMask::default();
        self.reporting = EventReporting::default();
        self.proposed = None;
        self.codec = None;
    }

    /// Current SLC progress
    #[must_use]
    pub const fn state(&self) -> SlcState {
        self.state
    }

    /// Local role
    #[must_use]
    pub const fn role(&self) -> Role {
        self.config.role
    }

    /// Codec both sides agreed on
    #[must_use]
    pub const fn codec(&self) -> Option<HfpCodec> {
        self.codec
    }

    /// Raw `BRSF` bitmask of the peer
    #[must_use]
    pub const fn peer_features(&self) -> u32 {
        self.peer_features
    }

    /// Codecs listed by the peer in `AT+BAC`
    #[must_use]
    pub fn peer_codecs(&self) -> &[HfpCodec] {
        &self.peer_codecs
    }

    /// Indicator map in use
    #[must_use]
    pub fn indicators(&self) -> &IndicatorMap {
        &self.indicators
    }

    /// Indicator activation set by `AT+BIA`
    #[must_use]
    pub const fn mask(&self) -> &IndicatorMask {
        &self.mask
    }

    /// Event reporting set by `AT+CMER`
    #[must_use]
    pub const fn reporting(&self) -> &EventReporting {
        &self.reporting
    }

    /// Current value of an indicator
    #[must_use]
    pub fn indicator(&self, kind: IndicatorKind) -> Option<u8> {
        self.indicators.position(kind).map(|pos| self.values[pos])
    }

    /// Handle one message from the peer
    pub fn handle(&mut self, command: &AtCommand) -> Outcome {
        debug!("[SLC] {} {}", command.kind().as_str(), command.name());
        if self.state == SlcState::Disconnected {
            warn!("[SLC] message while disconnected");
            return Outcome::none();
        }
        match self.config.role {
            Role::AudioGateway => self.handle_gateway(command),
            Role::HandsFree => self.handle_hands_free(command),
        }
    }

    fn advance(&mut self, next: SlcState) {
        if next > self.state {
            debug!("[SLC] {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn codec_negotiation(&self) -> bool {
        match self.config.role {
            Role::AudioGateway => {
                self.config
                    .ag_features
                    .supports(AgFeatures::CODEC_NEGOTIATION)
                    && HfFeatures(self.peer_features).supports(HfFeatures::CODEC_NEGOTIATION)
            }
            Role::HandsFree => {
                self.config
                    .hf_features
                    .supports(HfFeatures::CODEC_NEGOTIATION)
                    && AgFeatures(self.peer_features).supports(AgFeatures::CODEC_NEGOTIATION)
            }
        }
    }

    fn supports_locally(&self, codec: HfpCodec) -> bool {
        codec == HfpCodec::Cvsd || self.config.msbc
    }

    fn handle_gateway(&mut self, command: &AtCommand) -> Outcome {
        let value = command.value().unwrap_or("");
        match (command.kind(), command.name()) {
            (AtKind::Set, "BRSF") => match number::<u32>(value) {
                Some(features) => {
                    self.peer_features = features;
                    self.advance(SlcState::Brsf);
                    Outcome::none()
                        .reply(self.response("BRSF", self.config.ag_features.0))
                        .reply(AtCommand::ok())
                }
                None => Outcome::error(),
            },
            (AtKind::Set, "BAC") => match parse_codecs(value) {
                Some(codecs) => {
                    self.peer_codecs = codecs;
                    self.advance(SlcState::Bac);
                    Outcome::ok()
                }
                None => Outcome::error(),
            },
            (AtKind::Test, "CIND") => {
                let mut payload = AtValue::new();
                if self.indicators.render(&mut payload).is_err() {
                    return Outcome::error();
                }
                self.advance(SlcState::CindTest);
                Outcome::none()
                    .reply(AtCommand::response("CIND", &payload))
                    .reply(AtCommand::ok())
            }
            (AtKind::Get, "CIND") => {
                let payload = self.render_values();
                self.advance(SlcState::Cind);
                Outcome::none()
                    .reply(AtCommand::response("CIND", &payload))
                    .reply(AtCommand::ok())
            }
            (AtKind::Set, "CMER") => match parse_cmer(value) {
                Ok(reporting) => {
                    self.reporting = reporting;
                    self.advance(SlcState::Cmer);
                    if reporting.indicators_enabled() && self.state < SlcState::SlcConnected {
                        self.advance(SlcState::SlcConnected);
                        info!("[SLC] service level connection established");
                        Outcome::ok().with_event(SessionEvent::ServiceLevelConnected)
                    } else {
                        Outcome::ok()
                    }
                }
                Err(e) => {
                    warn!("[SLC] AT+CMER rejected: {}", e);
                    Outcome::error()
                }
            },
            (AtKind::Set, "BIA") => {
                if self.indicators.is_empty() {
                    return Outcome::error();
                }
                match parse_bia(value, &mut self.mask) {
                    Ok(()) => Outcome::ok(),
                    Err(_) => Outcome::error(),
                }
            }
            (AtKind::Set, "BCS") => {
                let codec = number::<u8>(value).and_then(HfpCodec::from_id);
                match codec {
                    Some(codec) if self.proposed == Some(codec) => {
                        self.proposed = None;
                        self.codec = Some(codec);
                        info!("[SLC] codec {:?} confirmed", codec);
                        Outcome::ok().with_event(SessionEvent::CodecSelected(codec))
                    }
                    _ => Outcome::error(),
                }
            }
            (AtKind::Set, "VGS") => match gain(value) {
                Some(gain) => Outcome::ok().with_event(SessionEvent::SpeakerGain(gain)),
                None => Outcome::error(),
            },
            (AtKind::Set, "VGM") => match gain(value) {
                Some(gain) => Outcome::ok().with_event(SessionEvent::MicrophoneGain(gain)),
                None => Outcome::error(),
            },
            (AtKind::Set, "CKPD") if number::<u16>(value) == Some(HSP_BUTTON_PRESS) => {
                Outcome::ok().with_event(SessionEvent::ButtonPressed)
            }
            _ => {
                debug!("[SLC] unsupported {} {}", command.kind().as_str(), command.name());
                Outcome::error()
            }
        }
    }

    fn handle_hands_free(&mut self, command: &AtCommand) -> Outcome {
        let value = command.value().unwrap_or("");
        if command.kind() != AtKind::Response {
            return Outcome::none();
        }
        match command.name() {
            "" => match value {
                "OK" => self.next_request(),
                "ERROR" if self.state == SlcState::Bac => {
                    // AG without codec negotiation; carry on with CVSD
                    self.next_request()
                }
                "ERROR" => {
                    warn!("[SLC] AG answered ERROR in {:?}", self.state);
                    Outcome::none()
                }
                "RING" => Outcome::none().with_event(SessionEvent::Ring),
                _ => Outcome::none(),
            },
            "BRSF" => {
                if let Some(features) = number::<u32>(value) {
                    self.peer_features = features;
                }
                Outcome::none()
            }
            "CIND" if self.state == SlcState::CindTest => {
                match parse_cind(value) {
                    Ok(map) => self.indicators = map,
                    Err(e) => warn!("[SLC] +CIND map rejected: {}", e),
                }
                Outcome::none()
            }
            "CIND" if self.state == SlcState::Cind => {
                for (slot, token) in self.values.iter_mut().zip(value.split(',')) {
                    if let Some(v) = number::<u8>(token) {
                        *slot = v;
                    }
                }
                Outcome::none()
            }
            "CIEV" => match parse_indicator_event(value, &self.indicators) {
                Ok((position, kind, v)) => {
                    self.values[position] = v;
                    Outcome::none().with_event(SessionEvent::Indicator { kind, value: v })
                }
                Err(e) => {
                    warn!("[SLC] +CIEV ignored: {}", e);
                    Outcome::none()
                }
            },
            "BCS" => match number::<u8>(value).and_then(HfpCodec::from_id) {
                Some(codec) if self.supports_locally(codec) => {
                    self.codec = Some(codec);
                    info!("[SLC] codec {:?} selected by AG", codec);
                    Outcome::none()
                        .reply(self.request("BCS", codec.id()))
                        .with_event(SessionEvent::CodecSelected(codec))
                }
                _ => Outcome::none().reply(AtCommand::set("BAC", self.local_codecs())),
            },
            "VGS" => gain(value).map_or_else(Outcome::none, |g| {
                Outcome::none().with_event(SessionEvent::SpeakerGain(g))
            }),
            "VGM" => gain(value).map_or_else(Outcome::none, |g| {
                Outcome::none().with_event(SessionEvent::MicrophoneGain(g))
            }),
            _ => Outcome::none(),
        }
    }

    /// The AG acknowledged the last request; send the next one
    fn next_request(&mut self) -> Outcome {
        let (next, request) = match self.state {
            SlcState::Connected | SlcState::Brsf if self.codec_negotiation() => (
                SlcState::Bac,
                AtCommand::set("BAC", self.local_codecs()),
            ),
            SlcState::Connected | SlcState::Brsf | SlcState::Bac => {
                (SlcState::CindTest, AtCommand::test("CIND"))
            }
            SlcState::CindTest => (SlcState::Cind, AtCommand::get("CIND")),
            SlcState::Cind => (SlcState::Cmer, AtCommand::set("CMER", "3,0,0,1,0")),
            SlcState::Cmer => {
                self.advance(SlcState::SlcConnected);
                info!("[SLC] service level connection established");
                return Outcome::none().with_event(SessionEvent::ServiceLevelConnected);
            }
            SlcState::Disconnected | SlcState::SlcConnected => return Outcome::none(),
        };
        self.advance(next);
        Outcome::none().reply(request)
    }

    fn local_codecs(&self) -> &'static str {
        if self.config.msbc { "1,2" } else { "1" }
    }

    /// AG role: propose a SCO codec once the SLC is up
    ///
    /// Returns `+BCS:<id>` when codec negotiation is in use. Without it CVSD
    /// is selected directly and `None` is returned.
    pub fn select_codec(&mut self) -> Option<AtCommand> {
        if self.config.role != Role::AudioGateway || self.state != SlcState::SlcConnected {
            return None;
        }
        if !self.codec_negotiation() {
            self.codec = Some(HfpCodec::Cvsd);
            return None;
        }
        let codec = if self.config.msbc && self.peer_codecs.contains(&HfpCodec::Msbc) {
            HfpCodec::Msbc
        } else {
            HfpCodec::Cvsd
        };
        self.proposed = Some(codec);
        Some(self.response("BCS", codec.id()))
    }

    /// AG role: update an indicator, returning `+CIEV` if the peer wants it
    pub fn set_indicator(&mut self, kind: IndicatorKind, value: u8) -> Option<AtCommand> {
        let position = self.indicators.position(kind)?;
        let value = value.min(kind.range().1);
        if self.values[position] == value {
            return None;
        }
        self.values[position] = value;

        let notify = self.config.role == Role::AudioGateway
            && self.state == SlcState::SlcConnected
            && self.reporting.indicators_enabled()
            && self.mask.is_enabled(position);
        if !notify {
            return None;
        }
        let mut payload = AtValue::new();
        write!(payload, "{},{}", position + 1, value).ok()?;
        Some(AtCommand::response("CIEV", &payload))
    }

    /// Report a speaker gain change to the peer
    #[must_use]
    pub fn speaker_gain(&self, gain: u8) -> AtCommand {
        self.gain_message("VGS", gain.min(HFP_MAX_GAIN))
    }

    /// Report a microphone gain change to the peer
    #[must_use]
    pub fn microphone_gain(&self, gain: u8) -> AtCommand {
        self.gain_message("VGM", gain.min(HFP_MAX_GAIN))
    }

    /// HS/HF role: headset button press
    #[must_use]
    pub fn button_press(&self) -> AtCommand {
        self.request("CKPD", HSP_BUTTON_PRESS)
    }

    fn gain_message(&self, name: &str, gain: u8) -> AtCommand {
        match self.config.role {
            Role::AudioGateway => self.response(name, gain),
            Role::HandsFree => self.request(name, gain),
        }
    }

    fn request(&self, name: &str, value: impl core::fmt::Display) -> AtCommand {
        let mut payload = AtValue::new();
        write!(payload, "{value}").ok();
        AtCommand::set(name, &payload)
    }

    fn response(&self, name: &str, value: impl core::fmt::Display) -> AtCommand {
        let mut payload = AtValue::new();
        write!(payload, "{value}").ok();
        AtCommand::response(name, &payload)
    }

    fn render_values(&self) -> AtValue {
        let mut payload = AtValue::new();
        for (i, value) in self.values[..self.indicators.len()].iter().enumerate() {
            let separator = if i == 0 { "" } else { "," };
            write!(payload, "{separator}{value}").ok();
        }
        payload
    }
}

fn number<T: core::str::FromStr>(text: &str) -> Option<T> {
    text.trim().parse().ok()
}

fn gain(text: &str) -> Option<u8> {
    number::<u8>(text).filter(|gain| *gain <= HFP_MAX_GAIN)
}

/// Parse an `AT+BAC` codec list, skipping IDs this crate does not know
fn parse_codecs(text: &str) -> Option<Vec<HfpCodec, MAX_PEER_CODECS>> {
    let mut codecs = Vec::new();
    for token in text.split(',') {
        let id = number::<u8>(token)?;
        if let Some(codec) = HfpCodec::from_id(id) {
            if !codecs.contains(&codec) {
                codecs.push(codec).ok()?;
            }
        }
    }
    Some(codecs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::{self, AtCommand};
    use heapless::String;

    fn feed(session: &mut ServiceLevel, text: &str) -> Outcome {
        session.handle(&at::parse(text))
    }

    fn rendered(outcome: &Outcome) -> Vec<String<300>, MAX_REPLIES> {
        outcome
            .replies
            .iter()
            .map(|reply| {
                let mut buffer = String::new();
                reply.render(&mut buffer).unwrap();
                buffer
            })
            .collect()
    }

    fn connected_gateway() -> ServiceLevel {
        let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
        assert!(session.connect().is_none());
        let hf = HfFeatures::CODEC_NEGOTIATION | HfFeatures::REMOTE_VOLUME;
        let mut brsf: String<32> = String::new();
        write!(brsf, "AT+BRSF={hf}\r").unwrap();
        feed(&mut session, &brsf);
        feed(&mut session, "AT+BAC=1,2\r");
        feed(&mut session, "AT+CIND=?\r");
        feed(&mut session, "AT+CIND?\r");
        let outcome = feed(&mut session, "AT+CMER=3,0,0,1,0\r");
        assert_eq!(outcome.event, Some(SessionEvent::ServiceLevelConnected));
        session
    }

    #[test]
    fn test_gateway_slc_exchange() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
        session.connect();

        let brsf = feed(&mut session, "AT+BRSF=128\r");
        let replies = rendered(&brsf);
        assert_eq!(replies[0].as_str(), "\r\n+BRSF:866\r\n");
        assert_eq!(replies[1].as_str(), "\r\nOK\r\n");
        assert_eq!(session.peer_features(), 128);

        let bac = feed(&mut session, "AT+BAC=1,2,7\r");
        assert_eq!(bac.replies[0], AtCommand::ok());
        assert_eq!(session.peer_codecs(), [HfpCodec::Cvsd, HfpCodec::Msbc]);

        let test = feed(&mut session, "AT+CIND=?\r");
        let map = at::parse_cind(test.replies[0].value().unwrap()).unwrap();
        assert_eq!(map, IndicatorMap::standard());

        let get = feed(&mut session, "AT+CIND?\r");
        assert_eq!(get.replies[0].value(), Some("0,0,0,0,0,0,0"));
        assert_eq!(session.state(), SlcState::Cind);

        let cmer = feed(&mut session, "AT+CMER=3,0,0,1,0\r");
        assert_eq!(cmer.event, Some(SessionEvent::ServiceLevelConnected));
        assert_eq!(session.state(), SlcState::SlcConnected);
    }

    #[test]
    fn test_gateway_cind_read_reports_current_values() {
        let mut session = connected_gateway();

        let signal = session.set_indicator(IndicatorKind::Signal, 5).unwrap();
        assert_eq!(signal.value(), Some("5,5"));
        // clamped to the indicator range
        let battery = session.set_indicator(IndicatorKind::BattChg, 9).unwrap();
        assert_eq!(battery.value(), Some("7,5"));

        let get = feed(&mut session, "AT+CIND?\r");
        assert_eq!(get.replies[0].value(), Some("0,0,0,0,5,0,5"));
        assert_eq!(session.state(), SlcState::SlcConnected);
    }

    #[test]
    fn test_gateway_rejects_short_cmer() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
        session.connect();
        let outcome = feed(&mut session, "AT+CMER=3,0,0\r");
        assert_eq!(outcome.replies[0], AtCommand::error());
        assert_eq!(outcome.event, None);
        assert_eq!(session.state(), SlcState::Connected);
    }

    #[test]
    fn test_gateway_bia_against_empty_map_is_error() {
        let config = ServiceLevelConfig::audio_gateway().with_indicators(IndicatorMap::new());
        let mut session = ServiceLevel::new(config);
        session.connect();
        assert_eq!(
            feed(&mut session, "AT+BIA=1,0\r").replies[0],
            AtCommand::error()
        );

        let mut standard = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
        standard.connect();
        assert_eq!(
            feed(&mut standard, "AT+BIA=,0\r").replies[0],
            AtCommand::ok()
        );
        assert!(!standard.mask().is_enabled(1));
        assert_eq!(
            feed(&mut standard, "AT+BIA=2\r").replies[0],
            AtCommand::error()
        );
    }

    #[test]
    fn test_gateway_codec_selection() {
        let mut session = connected_gateway();

        let proposal = session.select_codec().unwrap();
        assert_eq!(proposal, AtCommand::response("BCS", "2"));

        assert_eq!(
            feed(&mut session, "AT+BCS=1\r").replies[0],
            AtCommand::error()
        );
        assert_eq!(session.codec(), None);

        let confirm = feed(&mut session, "AT+BCS=2\r");
        assert_eq!(
            confirm.event,
            Some(SessionEvent::CodecSelected(HfpCodec::Msbc))
        );
        assert_eq!(session.codec(), Some(HfpCodec::Msbc));
    }

    #[test]
    fn test_gateway_without_msbc_proposes_cvsd() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway().with_msbc(false));
        session.connect();
        feed(&mut session, "AT+BRSF=128\r");
        feed(&mut session, "AT+BAC=1,2\r");
        feed(&mut session, "AT+CMER=3,0,0,1,0\r");
        assert_eq!(
            session.select_codec(),
            Some(AtCommand::response("BCS", "1"))
        );
    }

    #[test]
    fn test_gateway_indicator_notifications_follow_mask() {
        let mut session = connected_gateway();

        let ciev = session.set_indicator(IndicatorKind::Call, 1).unwrap();
        assert_eq!(ciev, AtCommand::response("CIEV", "2,1"));
        // unchanged value
        assert_eq!(session.set_indicator(IndicatorKind::Call, 1), None);

        feed(&mut session, "AT+BIA=1,0\r");
        assert_eq!(session.set_indicator(IndicatorKind::Call, 0), None);
        assert_eq!(session.indicator(IndicatorKind::Call), Some(0));

        // clamped to the indicator range
        let signal = session.set_indicator(IndicatorKind::Signal, 9).unwrap();
        assert_eq!(signal.value(), Some("5,5"));
    }

    #[test]
    fn test_gateway_volume_button_and_unknown() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
        session.connect();

        assert_eq!(
            feed(&mut session, "AT+VGS=12\r").event,
            Some(SessionEvent::SpeakerGain(12))
        );
        assert_eq!(
            feed(&mut session, "AT+VGM=3\r").event,
            Some(SessionEvent::MicrophoneGain(3))
        );
        assert_eq!(
            feed(&mut session, "AT+VGS=16\r").replies[0],
            AtCommand::error()
        );
        assert_eq!(
            feed(&mut session, "AT+CKPD=200\r").event,
            Some(SessionEvent::ButtonPressed)
        );
        assert_eq!(
            feed(&mut session, "AT+CHLD=?\r").replies[0],
            AtCommand::error()
        );
        assert_eq!(feed(&mut session, "XYZZY\r").replies[0], AtCommand::error());
        assert_eq!(session.speaker_gain(20), AtCommand::response("VGS", "15"));
    }

    #[test]
    fn test_messages_ignored_while_disconnected() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::audio_gateway());
        assert_eq!(feed(&mut session, "AT+BRSF=0\r"), Outcome::default());
    }

    #[test]
    fn test_hands_free_slc_exchange() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::hands_free());
        let brsf = session.connect().unwrap();
        assert!(brsf.is(AtKind::Set, "BRSF"));

        assert_eq!(feed(&mut session, "\r\n+BRSF:811\r\n"), Outcome::default());

        let bac = feed(&mut session, "\r\nOK\r\n");
        assert_eq!(bac.replies[0], AtCommand::set("BAC", "1,2"));

        let cind_test = feed(&mut session, "\r\nOK\r\n");
        assert_eq!(cind_test.replies[0], AtCommand::test("CIND"));

        feed(
            &mut session,
            "\r\n+CIND: (\"call\",(0,1)),(\"callsetup\",(0,3)),(\"service\",(0,1))\r\n",
        );
        let cind_get = feed(&mut session, "\r\nOK\r\n");
        assert_eq!(cind_get.replies[0], AtCommand::get("CIND"));
        assert_eq!(session.indicators().get(2), Some(IndicatorKind::Service));

        feed(&mut session, "\r\n+CIND: 0,0,1\r\n");
        assert_eq!(session.indicator(IndicatorKind::Service), Some(1));

        let cmer = feed(&mut session, "\r\nOK\r\n");
        assert_eq!(cmer.replies[0], AtCommand::set("CMER", "3,0,0,1,0"));

        let done = feed(&mut session, "\r\nOK\r\n");
        assert_eq!(done.event, Some(SessionEvent::ServiceLevelConnected));
        assert_eq!(session.state(), SlcState::SlcConnected);

        let ciev = feed(&mut session, "\r\n+CIEV: 2,1\r\n");
        assert_eq!(
            ciev.event,
            Some(SessionEvent::Indicator {
                kind: IndicatorKind::CallSetup,
                value: 1
            })
        );
    }

    #[test]
    fn test_hands_free_skips_bac_without_negotiation() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::hands_free());
        session.connect();
        feed(&mut session, "\r\n+BRSF:0\r\n");
        let next = feed(&mut session, "\r\nOK\r\n");
        assert_eq!(next.replies[0], AtCommand::test("CIND"));
    }

    #[test]
    fn test_hands_free_ciev_before_cind_is_ignored() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::hands_free());
        session.connect();
        let outcome = feed(&mut session, "\r\n+CIEV: 1,1\r\n");
        assert_eq!(outcome.event, None);
    }

    #[test]
    fn test_hands_free_answers_codec_selection() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::hands_free());
        session.connect();

        for (response, request) in [("\r\n+BCS:1\r\n", "AT+BCS=1\r"), ("\r\n+BCS:2\r\n", "AT+BCS=2\r")] {
            let outcome = feed(&mut session, response);
            assert_eq!(rendered(&outcome)[0].as_str(), request);
        }
        assert_eq!(session.codec(), Some(HfpCodec::Msbc));

        let mut narrow = ServiceLevel::new(ServiceLevelConfig::hands_free().with_msbc(false));
        narrow.connect();
        let outcome = feed(&mut narrow, "\r\n+BCS:2\r\n");
        assert_eq!(outcome.replies[0], AtCommand::set("BAC", "1"));
        assert_eq!(outcome.event, None);
    }

    #[test]
    fn test_hands_free_gain_and_button() {
        let mut session = ServiceLevel::new(ServiceLevelConfig::hands_free());
        session.connect();
        assert_eq!(
            feed(&mut session, "\r\n+VGS:7\r\n").event,
            Some(SessionEvent::SpeakerGain(7))
        );
        assert_eq!(session.speaker_gain(9), AtCommand::set("VGS", "9"));
        assert_eq!(session.button_press(), AtCommand::set("CKPD", "200"));
        assert_eq!(
            feed(&mut session, "\r\nRING\r\n").event,
            Some(SessionEvent::Ring)
        );
    }
}
