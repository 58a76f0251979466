//! `Accept` header parsing for response negotiation.

/// One entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub media: String,
    pub quality: f64,
}

/// Splits an `Accept` value into media ranges ordered by quality, highest first.
///
/// Entries of equal quality keep their header order. An entry whose `q`
/// parameter does not parse is dropped; one with no `q` has quality 1.
///
/// ```
/// use restmux::entity::accept::sorted_media_ranges;
///
/// let ranges = sorted_media_ranges("text/html;q=0.5, application/xml, */*;q=0.1");
/// let media: Vec<_> = ranges.iter().map(|r| r.media.as_str()).collect();
/// assert_eq!(media, ["application/xml", "text/html", "*/*"]);
/// ```
pub fn sorted_media_ranges(accept: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = Vec::new();
    for entry in accept.split(',') {
        let mut parts = entry.trim().split(';');
        let media = parts.next().unwrap_or("").trim();
        if media.is_empty() {
            continue;
        }
        let quality = match parts.find_map(|p| p.trim().strip_prefix("q=")) {
            Some(q) => match q.trim().parse::<f64>() {
                Ok(q) => q,
                Err(err) => {
                    tracing::debug!(entry, error = %err, "unable to parse quality");
                    continue;
                }
            },
            None => 1.0,
        };
        // Insert after every range of equal or higher quality.
        let at = ranges
            .iter()
            .position(|r| r.quality < quality)
            .unwrap_or(ranges.len());
        ranges.insert(
            at,
            MediaRange {
                media: media.to_owned(),
                quality,
            },
        );
    }
    ranges
}

/// Strips parameters and whitespace from each comma separated entry.
pub(crate) fn bare_media_types(header: &str) -> impl Iterator<Item = &str> {
    header
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or("").trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_quality_keeps_header_order() {
        let ranges = sorted_media_ranges("application/json, application/xml");
        assert_eq!(ranges[0].media, "application/json");
        assert_eq!(ranges[1].media, "application/xml");
    }

    #[test]
    fn unparsable_quality_is_dropped() {
        let ranges = sorted_media_ranges("application/json;q=abc, application/xml");
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].media, "application/xml");
    }

    #[test]
    fn empty_header_has_no_ranges() {
        assert!(sorted_media_ranges("").is_empty());
    }

    #[test]
    fn bare_types_drop_parameters() {
        let header = " application/json;q=0.9 , text/plain";
        let types: Vec<_> = bare_media_types(header).collect();
        assert_eq!(types, ["application/json", "text/plain"]);
    }
}
