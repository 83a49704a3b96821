//! Errors and statuses observable at the crate boundary.

use crate::device::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("window is not viewable")]
    NotViewable,
    #[error("device is already grabbed")]
    AlreadyGrabbed,
    #[error("device is frozen by another grab")]
    Frozen,
    #[error("request failed")]
    Failed,
    #[error("invalid operation on {device}: {reason}")]
    InvalidDevice {
        device: DeviceId,
        reason: &'static str,
    },
}

/// Result of grab and warp requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrabStatus {
    Success,
    AlreadyGrabbed,
    /// The grab time is older than the last grab, or newer than the server time.
    InvalidTime,
    NotViewable,
    Frozen,
    Failed,
}

impl GrabStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn into_result(self) -> Result<(), InputError> {
        match self {
            Self::Success => Ok(()),
            Self::AlreadyGrabbed | Self::InvalidTime => Err(InputError::AlreadyGrabbed),
            Self::NotViewable => Err(InputError::NotViewable),
            Self::Frozen => Err(InputError::Frozen),
            Self::Failed => Err(InputError::Failed),
        }
    }
}

impl From<InputError> for GrabStatus {
    fn from(err: InputError) -> Self {
        match err {
            InputError::NotViewable => Self::NotViewable,
            InputError::AlreadyGrabbed => Self::AlreadyGrabbed,
            InputError::Frozen => Self::Frozen,
            InputError::Failed | InputError::InvalidDevice { .. } => Self::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_conversion() {
        assert_eq!(GrabStatus::Success.into_result(), Ok(()));
        assert_eq!(
            GrabStatus::NotViewable.into_result(),
            Err(InputError::NotViewable)
        );
        assert_eq!(GrabStatus::from(InputError::Frozen), GrabStatus::Frozen);
    }

    #[test]
    fn invalid_device_message() {
        let err = InputError::InvalidDevice {
            device: DeviceId(4),
            reason: "keyboards have no axes",
        };
        assert_eq!(
            err.to_string(),
            "invalid operation on device 4: keyboards have no axes"
        );
    }
}
