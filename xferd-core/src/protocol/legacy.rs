//! Legacy five-field status record
//!
//! Older workers report a reduced status shape with a text file id. It is
//! decoded here and lifted into the canonical [`TransferStatus`]; the two
//! shapes are not layout-compatible.
//!
//! Layout (little-endian, text fields NUL-padded):
//!
//! | field    | bytes |
//! |----------|-------|
//! | pid      | 4     |
//! | job_id   | 36    |
//! | file_id  | 120   |
//! | status   | 50    |
//! | message  | 1024  |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::messages::{TransferStatus, TRANSFER_MESSAGE_LEN, TRANSFER_STATUS_LEN};
use super::text::{FixedText, JobId, JOB_ID_LEN};
use crate::error::{Result, XferdError};

/// Text file id width in the legacy shape
pub const LEGACY_FILE_ID_LEN: usize = 120;
/// Queue depth used by legacy deployments
pub const LEGACY_MAX_NUM_MSGS: usize = 10_000;
/// Encoded record size
pub const LEGACY_RECORD_LEN: usize =
    4 + JOB_ID_LEN + LEGACY_FILE_ID_LEN + TRANSFER_STATUS_LEN + TRANSFER_MESSAGE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyStatus {
    pub pid: i32,
    pub job_id: FixedText<JOB_ID_LEN>,
    pub file_id: FixedText<LEGACY_FILE_ID_LEN>,
    pub status: FixedText<TRANSFER_STATUS_LEN>,
    pub message: FixedText<TRANSFER_MESSAGE_LEN>,
}

impl LegacyStatus {
    pub fn new(pid: i32, job_id: &str, file_id: &str, status: &str, message: &str) -> Self {
        Self {
            pid,
            job_id: FixedText::new(job_id),
            file_id: FixedText::new(file_id),
            status: FixedText::new(status),
            message: FixedText::new(message),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LEGACY_RECORD_LEN);
        buf.put_i32_le(self.pid);
        put_padded(&mut buf, self.job_id.as_bytes(), JOB_ID_LEN);
        put_padded(&mut buf, self.file_id.as_bytes(), LEGACY_FILE_ID_LEN);
        put_padded(&mut buf, self.status.as_bytes(), TRANSFER_STATUS_LEN);
        put_padded(&mut buf, self.message.as_bytes(), TRANSFER_MESSAGE_LEN);
        buf.freeze()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() != LEGACY_RECORD_LEN {
            return Err(XferdError::InvalidMessage {
                reason: format!(
                    "legacy record is {} bytes, expected {}",
                    data.len(),
                    LEGACY_RECORD_LEN
                ),
            });
        }
        let pid = data.get_i32_le();
        let job_id = take_text(&mut data, JOB_ID_LEN, "job_id")?;
        let file_id = take_text(&mut data, LEGACY_FILE_ID_LEN, "file_id")?;
        let status = take_text(&mut data, TRANSFER_STATUS_LEN, "status")?;
        let message = take_text(&mut data, TRANSFER_MESSAGE_LEN, "message")?;
        Ok(Self {
            pid,
            job_id: FixedText::new(job_id),
            file_id: FixedText::new(file_id),
            status: FixedText::new(status),
            message: FixedText::new(message),
        })
    }

    /// Lift into the canonical status record
    pub fn to_status(&self) -> Result<TransferStatus> {
        let file_id = self
            .file_id
            .as_str()
            .trim()
            .parse::<u64>()
            .map_err(|e| XferdError::InvalidMessage {
                reason: format!("legacy file id {:?}: {}", self.file_id.as_str(), e),
            })?;
        let mut status = TransferStatus::new(JobId::new(self.job_id.as_str()), file_id, self.status.as_str())
            .with_message(self.message.as_str());
        status.process_id = u32::try_from(self.pid).unwrap_or(0);
        Ok(status)
    }
}

fn put_padded(buf: &mut BytesMut, text: &[u8], width: usize) {
    buf.put_slice(text);
    buf.put_bytes(0, width - text.len());
}

fn take_text<'a>(data: &mut &'a [u8], width: usize, field: &str) -> Result<&'a str> {
    let (raw, rest) = data.split_at(width);
    *data = rest;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    std::str::from_utf8(&raw[..end]).map_err(|e| XferdError::InvalidMessage {
        reason: format!("legacy {field} is not UTF-8: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_size_is_fixed() {
        let short = LegacyStatus::new(1, "a", "1", "ACTIVE", "");
        let long = LegacyStatus::new(1, &"j".repeat(80), "1", "ACTIVE", &"m".repeat(4000));
        assert_eq!(short.encode().len(), LEGACY_RECORD_LEN);
        assert_eq!(long.encode().len(), LEGACY_RECORD_LEN);
    }

    #[test]
    fn test_lift_to_canonical() {
        let job = JobId::generate();
        let legacy = LegacyStatus::new(4242, job.as_str(), "17", "FAILED", "timeout");
        let decoded = LegacyStatus::decode(&legacy.encode()).unwrap();
        assert_eq!(decoded, legacy);

        let status = decoded.to_status().unwrap();
        assert_eq!(status.job_id, job);
        assert_eq!(status.file_id, 17);
        assert_eq!(status.process_id, 4242);
        assert_eq!(status.status, "FAILED");
        assert_eq!(status.message, "timeout");
    }

    #[test]
    fn test_bad_records_rejected() {
        assert!(LegacyStatus::decode(&[0u8; 10]).is_err());

        let legacy = LegacyStatus::new(1, "job", "not-a-number", "ACTIVE", "");
        assert!(legacy.to_status().is_err());

        let mut raw = legacy.encode().to_vec();
        raw[4] = 0xff;
        assert!(LegacyStatus::decode(&raw).is_err());
    }
}
