use crate::errors::{RemBgError, Result};
use crate::model::ModelName;
use crate::traits::BackgroundRemover;
use parking_lot::Mutex;

/// Deterministic stand-in for the ONNX remover.
///
/// Output is `mock:<model>:` followed by the input bytes. Inputs starting with
/// the configured marker fail.
#[derive(Debug, Default)]
pub struct MockBackgroundRemover {
    fail_marker: Option<Vec<u8>>,
    calls: Mutex<Vec<(Vec<u8>, ModelName)>>,
}

impl MockBackgroundRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &[u8]) -> Self {
        Self {
            fail_marker: Some(marker.to_vec()),
            ..Self::default()
        }
    }

    /// Output the mock produces for `image`.
    pub fn expected_output(image: &[u8], model: ModelName) -> Vec<u8> {
        let mut output = format!("mock:{}:", model).into_bytes();
        output.extend_from_slice(image);
        output
    }

    /// Every input seen so far, in call order.
    pub fn calls(&self) -> Vec<(Vec<u8>, ModelName)> {
        self.calls.lock().clone()
    }
}

impl BackgroundRemover for MockBackgroundRemover {
    fn remove(&self, image: &[u8], model: ModelName) -> Result<Vec<u8>> {
        self.calls.lock().push((image.to_vec(), model));

        if let Some(marker) = &self.fail_marker {
            if image.starts_with(marker) {
                return Err(RemBgError::Model {
                    operation: "mock inference".to_string(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "mock failure",
                    )),
                });
            }
        }

        Ok(Self::expected_output(image, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_output() -> Result<()> {
        let mock = MockBackgroundRemover::new();
        let output = mock.remove(b"abc", ModelName::U2netp)?;

        assert_eq!(output, b"mock:u2netp:abc".to_vec());
        assert_eq!(mock.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn test_mock_failure_marker() {
        let mock = MockBackgroundRemover::failing_on(b"BAD");
        assert!(mock.remove(b"BAD image", ModelName::U2net).is_err());
        assert!(mock.remove(b"good image", ModelName::U2net).is_ok());
        assert_eq!(mock.calls().len(), 2);
    }
}
