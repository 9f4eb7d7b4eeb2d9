//! Line-driven simulation of tag presentations.
//!
//! Each input line names one tag: a hex UID, optionally followed by the hex
//! content of its admin block.
//!
//! ```text
//! 04ABCDEF
//! 0A0B0C0D 12345678
//! ```

use super::tag::{MockTag, MockTagHandle};
use crate::{HardwareError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Parse one simulation line.
///
/// Blank lines and `#` comments yield `None`.
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` if a field is not valid hex.
///
/// # Examples
///
/// ```
/// use timeclock_hardware::mock::parse_sim_line;
///
/// let tag = parse_sim_line("04abcdef 1234").unwrap().unwrap();
/// assert_eq!(tag.uid, vec![0x04, 0xAB, 0xCD, 0xEF]);
/// assert!(tag.sector.is_some());
/// assert!(parse_sim_line("  ").unwrap().is_none());
/// ```
pub fn parse_sim_line(line: &str) -> Result<Option<MockTag>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let decode = |field: &str| {
        hex::decode(field).map_err(|e| HardwareError::invalid_data(format!("'{field}': {e}")))
    };

    let mut tag = match fields.next() {
        Some(uid) => MockTag::new(decode(uid)?),
        None => return Ok(None),
    };
    if let Some(sector) = fields.next() {
        tag = tag.with_sector(decode(sector)?);
    }
    Ok(Some(tag))
}

/// Present a tag for every line read from `input` until EOF.
///
/// Malformed lines are logged and skipped. Returns the number of tags
/// presented.
///
/// # Errors
///
/// Returns an error if reading fails or the mock device has been dropped.
pub async fn feed_lines<R>(input: R, handle: &MockTagHandle) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut presented = 0;

    while let Some(line) = lines.next_line().await? {
        match parse_sim_line(&line) {
            Ok(Some(tag)) => {
                debug!(uid = %hex::encode_upper(&tag.uid), "simulated_tag");
                handle.present_tag(tag).await?;
                presented += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(line = %line, error = %e, "ignoring simulation line"),
        }
    }

    Ok(presented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTagDevice;
    use crate::traits::TagDevice;
    use rstest::rstest;

    #[rstest]
    #[case("04ABCDEF", vec![0x04, 0xAB, 0xCD, 0xEF], false)]
    #[case("  0a0b  ", vec![0x0A, 0x0B], false)]
    #[case("01020304 FFFF", vec![1, 2, 3, 4], true)]
    fn test_parse_sim_line(#[case] line: &str, #[case] uid: Vec<u8>, #[case] sector: bool) {
        let tag = parse_sim_line(line).unwrap().unwrap();
        assert_eq!(tag.uid, uid);
        assert_eq!(tag.sector.is_some(), sector);
    }

    #[rstest]
    #[case("XYZ")]
    #[case("123")]
    #[case("0102 GG")]
    fn test_parse_sim_line_invalid(#[case] line: &str) {
        assert!(parse_sim_line(line).is_err());
    }

    #[test]
    fn test_parse_sim_line_comment() {
        assert!(parse_sim_line("# badge of the janitor").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_feed_lines_skips_garbage() {
        let (mut device, handle) = MockTagDevice::new();
        let input: &[u8] = b"01020304\nnot-hex\n\n0A0B0C0D\n";

        let presented = feed_lines(input, &handle).await.unwrap();
        assert_eq!(presented, 2);

        device.wait_for_tag().await.unwrap();
        assert_eq!(device.anticoll().await.unwrap(), vec![1, 2, 3, 4]);
        device.wait_for_tag().await.unwrap();
        assert_eq!(device.anticoll().await.unwrap(), vec![10, 11, 12, 13]);
    }
}
