use crate::error::ApiError;
use crate::routes::GenerateRequest;

/// Maximum script length for generation requests
const MAX_SCRIPT_LENGTH: usize = 10_000;
/// Speaker count bounds supported by the model
const MIN_SPEAKERS: u32 = 1;
const MAX_SPEAKERS: u32 = 4;
/// Classifier-free guidance bounds
const MIN_CFG_SCALE: f32 = 1.0;
const MAX_CFG_SCALE: f32 = 2.0;

/// Validate a generation request before any generation work starts.
pub fn validate_generate_request(req: &GenerateRequest) -> Result<(), ApiError> {
    if req.script.trim().is_empty() {
        return Err(ApiError::InvalidInput("Script cannot be empty".to_string()));
    }
    if req.script.len() > MAX_SCRIPT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Script too long (max {} characters)",
            MAX_SCRIPT_LENGTH
        )));
    }

    if !(MIN_SPEAKERS..=MAX_SPEAKERS).contains(&req.num_speakers) {
        return Err(ApiError::InvalidInput(format!(
            "num_speakers must be between {} and {}",
            MIN_SPEAKERS, MAX_SPEAKERS
        )));
    }

    if !req.speakers.is_empty() && req.speakers.len() != req.num_speakers as usize {
        return Err(ApiError::InvalidInput(format!(
            "Number of speakers ({}) must match num_speakers ({})",
            req.speakers.len(),
            req.num_speakers
        )));
    }

    if !(MIN_CFG_SCALE..=MAX_CFG_SCALE).contains(&req.cfg_scale) {
        return Err(ApiError::InvalidInput(format!(
            "cfg_scale must be between {} and {}",
            MIN_CFG_SCALE, MAX_CFG_SCALE
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(script: &str, num_speakers: u32, speakers: &[&str], cfg_scale: f32) -> GenerateRequest {
        GenerateRequest {
            script: script.to_string(),
            num_speakers,
            speakers: speakers.iter().map(|s| s.to_string()).collect(),
            cfg_scale,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_generate_request(&request("Hello\nWorld", 2, &[], 1.3)).is_ok());
        assert!(validate_generate_request(&request("Hi", 1, &["anna"], 1.0)).is_ok());
    }

    #[test]
    fn test_empty_script_rejected() {
        let result = validate_generate_request(&request("   \n ", 2, &[], 1.3));
        assert!(result.is_err());
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("empty"));
        }
    }

    #[test]
    fn test_script_too_long_rejected() {
        let long_script = "a".repeat(MAX_SCRIPT_LENGTH + 1);
        let result = validate_generate_request(&request(&long_script, 2, &[], 1.3));
        assert!(result.is_err());
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("too long"));
        }
    }

    #[test]
    fn test_speaker_count_bounds() {
        assert!(validate_generate_request(&request("Hi", 0, &[], 1.3)).is_err());
        assert!(validate_generate_request(&request("Hi", 5, &[], 1.3)).is_err());
        assert!(validate_generate_request(&request("Hi", 4, &[], 1.3)).is_ok());
    }

    #[test]
    fn test_speaker_list_must_match_count() {
        // Three names for two slots is rejected before any generation work.
        let result = validate_generate_request(&request("Hi", 2, &["A", "B", "C"], 1.3));
        assert!(result.is_err());
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("must match num_speakers"));
        }
    }

    #[test]
    fn test_cfg_scale_bounds() {
        assert!(validate_generate_request(&request("Hi", 2, &[], 0.9)).is_err());
        assert!(validate_generate_request(&request("Hi", 2, &[], 2.1)).is_err());
        assert!(validate_generate_request(&request("Hi", 2, &[], 2.0)).is_ok());
    }
}
