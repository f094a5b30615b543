//! Лёгкий разбор SDP для диагностики: какие media-секции и кодеки в описании,
//! есть ли ICE credentials. Полноценный парсер здесь не нужен.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    /// video / audio / application
    pub kind: String,
    /// Имена кодеков из a=rtpmap (VP8, opus, ...)
    pub codecs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdpSummary {
    pub media: Vec<MediaSection>,
    pub has_ice_ufrag: bool,
    pub has_ice_pwd: bool,
}

impl SdpSummary {
    pub fn parse(sdp: &str) -> Self {
        let mut summary = SdpSummary::default();

        for line in sdp.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("m=") {
                let kind = rest.split_whitespace().next().unwrap_or_default();
                summary.media.push(MediaSection {
                    kind: kind.to_string(),
                    codecs: Vec::new(),
                });
            } else if let Some(rest) = line.strip_prefix("a=rtpmap:") {
                // a=rtpmap:96 VP8/90000
                let codec = rest
                    .split_whitespace()
                    .nth(1)
                    .and_then(|enc| enc.split('/').next());
                if let (Some(section), Some(codec)) = (summary.media.last_mut(), codec) {
                    if !section.codecs.iter().any(|c| c == codec) {
                        section.codecs.push(codec.to_string());
                    }
                }
            } else if line.starts_with("a=ice-ufrag:") {
                summary.has_ice_ufrag = true;
            } else if line.starts_with("a=ice-pwd:") {
                summary.has_ice_pwd = true;
            }
        }
        summary
    }

    pub fn has_ice_credentials(&self) -> bool {
        self.has_ice_ufrag && self.has_ice_pwd
    }

    pub fn count(&self, kind: &str) -> usize {
        self.media.iter().filter(|m| m.kind == kind).count()
    }

    pub fn video_codecs(&self) -> Vec<&str> {
        self.media
            .iter()
            .filter(|m| m.kind == "video")
            .flat_map(|m| m.codecs.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for SdpSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: Vec<String> = self
            .media
            .iter()
            .map(|m| format!("{}[{}]", m.kind, m.codecs.join(",")))
            .collect();
        write!(
            f,
            "media={} ice_credentials={}",
            sections.join(" "),
            self.has_ice_credentials()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "v=0\r\n\
o=- 1 2 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
a=ice-ufrag:abcd\r\n\
a=ice-pwd:secretsecret\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:97 rtx/90000\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=rtpmap:111 opus/48000/2\r\n";

    #[test]
    fn collects_sections_and_codecs() {
        let summary = SdpSummary::parse(ANSWER);
        assert_eq!(summary.count("video"), 1);
        assert_eq!(summary.count("audio"), 1);
        assert_eq!(summary.video_codecs(), vec!["VP8", "rtx"]);
        assert_eq!(summary.media[1].codecs, vec!["opus".to_string()]);
        assert!(summary.has_ice_credentials());
    }

    #[test]
    fn missing_pwd_means_no_credentials() {
        let summary = SdpSummary::parse("v=0\r\nm=video 9 RTP/AVP 96\r\na=ice-ufrag:x\r\n");
        assert!(summary.has_ice_ufrag);
        assert!(!summary.has_ice_credentials());
    }

    #[test]
    fn empty_sdp_has_no_media() {
        let summary = SdpSummary::parse("");
        assert!(summary.media.is_empty());
        assert_eq!(summary.to_string(), "media= ice_credentials=false");
    }
}
