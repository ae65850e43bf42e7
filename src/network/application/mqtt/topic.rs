//! Topic names, topic filters and wildcard matching.
//!
//! Topic names are what publishers send to; topic filters are what
//! subscribers register, and may contain the single-level (`+`) and
//! multi-level (`#`) wildcards.

use super::client::MAX_TOPIC_LEN;
use crate::network::error::Error;

const LEVEL_SEPARATOR: char = '/';
const SINGLE_LEVEL_WILDCARD: &str = "+";
const MULTI_LEVEL_WILDCARD: &str = "#";

/// Check that `topic` can be used as the topic of a PUBLISH.
///
/// A topic name is non-empty, fits [`MAX_TOPIC_LEN`], and contains neither
/// wildcard characters nor NUL.
pub fn validate_topic_name(topic: &str) -> Result<(), Error> {
    if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
        return Err(Error::InvalidTopic);
    }
    if topic.contains(['+', '#', '\0']) {
        return Err(Error::InvalidTopic);
    }
    Ok(())
}

/// Check that `filter` is a well-formed subscription filter.
///
/// `+` must occupy a whole level; `#` must occupy the whole last level.
pub fn validate_topic_filter(filter: &str) -> Result<(), Error> {
    if filter.is_empty() || filter.len() > MAX_TOPIC_LEN || filter.contains('\0') {
        return Err(Error::InvalidTopic);
    }

    let mut levels = filter.split(LEVEL_SEPARATOR).peekable();
    while let Some(level) = levels.next() {
        let is_last = levels.peek().is_none();
        if level.contains('#') && (level != MULTI_LEVEL_WILDCARD || !is_last) {
            return Err(Error::InvalidTopic);
        }
        if level.contains('+') && level != SINGLE_LEVEL_WILDCARD {
            return Err(Error::InvalidTopic);
        }
    }
    Ok(())
}

/// Returns `true` when `topic` matches `filter`.
///
/// Wildcards at the first level never match topics beginning with `$`.
///
/// ```rust
/// use iotdemo::network::application::mqtt::topic::matches;
///
/// assert!(matches("iotdemo/topic/+", "iotdemo/topic/3"));
/// assert!(matches("iotdemo/#", "iotdemo/topic/3"));
/// assert!(!matches("iotdemo/topic/+", "iotdemo/acknowledgements"));
/// assert!(!matches("#", "$SYS/uptime"));
/// ```
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split(LEVEL_SEPARATOR);
    let mut topic_levels = topic.split(LEVEL_SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL_WILDCARD), _) => return true,
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcard_matches() {
        assert!(matches("iotdemo/topic/1", "iotdemo/topic/1"));
        assert!(!matches("iotdemo/topic/1", "iotdemo/topic/2"));
        assert!(matches("iotdemo/+/1", "iotdemo/topic/1"));
        assert!(matches("iotdemo/#", "iotdemo"));
        assert!(matches("iotdemo/#", "iotdemo/topic/1"));
        assert!(!matches("iotdemo/topic", "iotdemo/topic/1"));
        assert!(!matches("iotdemo/topic/1/extra", "iotdemo/topic/1"));
    }

    #[test]
    fn wildcards_skip_dollar_topics() {
        assert!(!matches("+/uptime", "$SYS/uptime"));
        assert!(matches("$SYS/+", "$SYS/uptime"));
    }

    #[test]
    fn filter_validation() {
        assert!(validate_topic_filter("cdf/certificates/+/responseCSR").is_ok());
        assert!(validate_topic_filter("iotdemo/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert_eq!(validate_topic_filter("iotdemo/#/x"), Err(Error::InvalidTopic));
        assert_eq!(validate_topic_filter("iotdemo/topic+"), Err(Error::InvalidTopic));
        assert_eq!(validate_topic_filter(""), Err(Error::InvalidTopic));
    }

    #[test]
    fn name_validation() {
        assert!(validate_topic_name("iotdemo/acknowledgements").is_ok());
        assert_eq!(validate_topic_name("iotdemo/+"), Err(Error::InvalidTopic));
        assert_eq!(validate_topic_name(""), Err(Error::InvalidTopic));
    }
}
