//! Supported RDF serializations and `Accept` header negotiation.

use oxigraph::io::RdfFormat;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// RDF serializations understood by the service.
///
/// Parsing only tries [`RdfSerialization::PARSE_ORDER`]; N-Triples is an
/// output format (any N-Triples document already parses as Turtle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum RdfSerialization {
    #[strum(serialize = "text/turtle")]
    Turtle,
    #[strum(serialize = "application/ld+json")]
    JsonLd,
    #[strum(serialize = "application/rdf+xml")]
    RdfXml,
    #[strum(serialize = "application/n-triples")]
    NTriples,
}

impl RdfSerialization {
    /// Order in which formats are tried when the content type is absent or unusable.
    pub const PARSE_ORDER: [RdfSerialization; 3] = [
        RdfSerialization::Turtle,
        RdfSerialization::JsonLd,
        RdfSerialization::RdfXml,
    ];

    pub fn media_type(self) -> &'static str {
        match self {
            RdfSerialization::Turtle => "text/turtle",
            RdfSerialization::JsonLd => "application/ld+json",
            RdfSerialization::RdfXml => "application/rdf+xml",
            RdfSerialization::NTriples => "application/n-triples",
        }
    }

    /// Maps a `Content-Type` or `Accept` entry to a serialization.
    ///
    /// Parameters (`; charset=utf-8`, `; q=0.5`) are ignored.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/turtle" | "application/x-turtle" => Some(RdfSerialization::Turtle),
            "application/ld+json" => Some(RdfSerialization::JsonLd),
            "application/rdf+xml" => Some(RdfSerialization::RdfXml),
            "application/n-triples" => Some(RdfSerialization::NTriples),
            _ => None,
        }
    }

    pub fn rdf_format(self) -> Option<RdfFormat> {
        match self {
            RdfSerialization::Turtle => Some(RdfFormat::Turtle),
            RdfSerialization::RdfXml => Some(RdfFormat::RdfXml),
            RdfSerialization::NTriples => Some(RdfFormat::NTriples),
            RdfSerialization::JsonLd => RdfFormat::from_media_type(self.media_type()),
        }
    }

    /// Value sent as `Accept` when dereferencing a graph.
    pub fn accept_header() -> &'static str {
        "text/turtle, application/ld+json;q=0.9, application/rdf+xml;q=0.8"
    }
}

/// Picks the response serialization for an `Accept` header.
///
/// A missing header, an empty header or one containing `*/*` yields Turtle.
/// Otherwise the recognised entry with the highest quality wins; `None` means
/// nothing acceptable was offered.
pub fn negotiate(accept: Option<&str>) -> Option<RdfSerialization> {
    let accept = match accept.map(str::trim) {
        None | Some("") => return Some(RdfSerialization::Turtle),
        Some(value) => value,
    };
    if accept.contains("*/*") {
        return Some(RdfSerialization::Turtle);
    }

    let mut best: Option<(f32, RdfSerialization)> = None;
    for entry in accept.split(',') {
        let Some(format) = RdfSerialization::from_media_type(entry) else {
            continue;
        };
        let quality = entry
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if quality <= 0.0 {
            continue;
        }
        match best {
            Some((best_quality, _)) if best_quality >= quality => {}
            _ => best = Some((quality, format)),
        }
    }
    best.map(|(_, format)| format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_parameters_are_ignored() {
        assert_eq!(
            RdfSerialization::from_media_type("text/turtle; charset=utf-8"),
            Some(RdfSerialization::Turtle)
        );
        assert_eq!(
            RdfSerialization::from_media_type("Application/LD+JSON"),
            Some(RdfSerialization::JsonLd)
        );
        assert_eq!(RdfSerialization::from_media_type("text/html"), None);
    }

    #[test]
    fn negotiate_defaults_to_turtle() {
        assert_eq!(negotiate(None), Some(RdfSerialization::Turtle));
        assert_eq!(negotiate(Some("")), Some(RdfSerialization::Turtle));
        assert_eq!(
            negotiate(Some("text/html, */*;q=0.1")),
            Some(RdfSerialization::Turtle)
        );
    }

    #[test]
    fn negotiate_prefers_highest_quality() {
        assert_eq!(
            negotiate(Some("text/turtle;q=0.5, application/rdf+xml")),
            Some(RdfSerialization::RdfXml)
        );
        assert_eq!(
            negotiate(Some("application/ld+json")),
            Some(RdfSerialization::JsonLd)
        );
    }

    #[test]
    fn negotiate_rejects_unknown_types() {
        assert_eq!(negotiate(Some("text/html")), None);
        assert_eq!(negotiate(Some("text/turtle;q=0")), None);
    }

    #[test]
    fn display_is_the_media_type() {
        assert_eq!(RdfSerialization::RdfXml.to_string(), "application/rdf+xml");
    }
}
