//! Media-line routing for inbound tracks.
//!
//! Each `m=` section of a session description names its media kind and,
//! through `a=mid:`, the transceiver it belongs to. The map is built from the
//! descriptions as they are applied so an inbound track can be routed by its
//! mid instead of by position.

use crate::peer::types::MediaKind;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MediaLines {
    by_mid: HashMap<String, MediaKind>,
}

impl MediaLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every audio/video media line found in `sdp`. Existing entries
    /// for the same mid are kept; mids are stable once assigned.
    pub fn learn_from_sdp(&mut self, sdp: &str) {
        let mut current: Option<MediaKind> = None;
        for line in sdp.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(rest) = line.strip_prefix("m=") {
                current = rest
                    .split_whitespace()
                    .next()
                    .and_then(MediaKind::from_media_name);
            } else if let Some(mid) = line.strip_prefix("a=mid:") {
                if let Some(kind) = current {
                    self.by_mid.entry(mid.trim().to_string()).or_insert(kind);
                }
            }
        }
    }

    pub fn kind_of(&self, mid: &str) -> Option<MediaKind> {
        self.by_mid.get(mid).copied()
    }

    pub fn len(&self) -> usize {
        self.by_mid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP: &str = "v=0\r\n\
o=- 1 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:1\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=mid:2\r\n";

    #[test]
    fn mids_map_to_their_media_kind() {
        let mut lines = MediaLines::new();
        lines.learn_from_sdp(SDP);
        assert_eq!(lines.kind_of("0"), Some(MediaKind::Audio));
        assert_eq!(lines.kind_of("1"), Some(MediaKind::Video));
        assert_eq!(lines.kind_of("2"), None);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn mapping_does_not_depend_on_position() {
        let swapped = "m=video 9 RTP/AVP 96\na=mid:a\nm=audio 9 RTP/AVP 111\na=mid:b\n";
        let mut lines = MediaLines::new();
        lines.learn_from_sdp(swapped);
        assert_eq!(lines.kind_of("a"), Some(MediaKind::Video));
        assert_eq!(lines.kind_of("b"), Some(MediaKind::Audio));
    }
}
