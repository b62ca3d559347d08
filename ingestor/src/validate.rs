use crate::errors::{Error, Result};
use crate::model::{DeviceChanges, NewDevice, ReadingSubmission};

const NAME_MAX_LEN: usize = 100;
const OWNER_MAX_LEN: usize = 150;
const PRIORITY_MIN: i32 = 1;

/// Validates a reading submission. Every channel is optional, but a present
/// value must be a finite number. All offending fields are reported at once.
pub fn validate_submission(submission: &ReadingSubmission) -> Result<()> {
    let channels = [
        ("current", submission.current),
        ("temperature", submission.temperature),
        ("vibration", submission.vibration),
        ("voltage", submission.voltage),
    ];

    let invalid: Vec<String> = channels
        .iter()
        .filter(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        .map(|(name, _)| name.to_string())
        .collect();

    if !invalid.is_empty() {
        return Err(Error::InvalidFields(invalid));
    }

    Ok(())
}

pub fn validate_new_device(device: &NewDevice) -> Result<()> {
    validate_name(&device.name)?;
    validate_priority(device.priority)?;

    if device.owner.chars().count() > OWNER_MAX_LEN {
        return Err(Error::Validation(format!(
            "Owner longer than {} characters",
            OWNER_MAX_LEN
        )));
    }

    Ok(())
}

pub fn validate_changes(changes: &DeviceChanges) -> Result<()> {
    if let Some(name) = &changes.name {
        validate_name(name)?;
    }
    if let Some(priority) = changes.priority {
        validate_priority(priority)?;
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Device name cannot be empty".to_string()));
    }

    if name.chars().count() > NAME_MAX_LEN {
        return Err(Error::Validation(format!(
            "Device name longer than {} characters",
            NAME_MAX_LEN
        )));
    }

    Ok(())
}

fn validate_priority(priority: i32) -> Result<()> {
    if priority < PRIORITY_MIN {
        return Err(Error::Validation(format!(
            "Priority {} below minimum {}",
            priority, PRIORITY_MIN
        )));
    }
    Ok(())
}
