use std::env;
use std::sync::OnceLock;

use super::validation::validate;
use super::{ServerConfig, Voice};
use crate::errors::call_error::{CallError, CallResult};

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn required(key: &'static str) -> CallResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CallError::MissingConfiguration(key.to_string())),
    }
}

fn parse_u64(key: &'static str, default: u64) -> CallResult<u64> {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|e| CallError::MissingConfiguration(format!("{key} (invalid number: {e})"))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible
    /// defaults. Also loads from a `.env` file if present using dotenvy.
    ///
    /// # Errors
    /// Returns `CallError::MissingConfiguration` if a required variable is
    /// absent or a value is malformed.
    pub fn from_env() -> CallResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let provider = required("PHONE_PROVIDER")?.parse()?;
        let carrier_account_id = required("CARRIER_ACCOUNT_ID")?;
        let carrier_secret = required("CARRIER_SECRET")?;
        let carrier_public_key = env::var("CARRIER_PUBLIC_KEY").ok().filter(|v| !v.is_empty());
        let from_number = required("FROM_NUMBER")?;
        let user_number = required("USER_NUMBER")?;

        let openai_api_key = required("OPENAI_API_KEY")?;
        let tts_voice = match env::var("TTS_VOICE") {
            Ok(v) => v.parse()?,
            Err(_) => Voice::default(),
        };
        let tts_model =
            env::var("TTS_MODEL").unwrap_or_else(|_| "gpt-4o-mini-tts".to_string());
        let stt_model =
            env::var("STT_MODEL").unwrap_or_else(|_| "gpt-4o-transcribe".to_string());
        let stt_silence_ms = parse_u64("STT_SILENCE_MS", 800)?;
        let transcript_timeout_ms = parse_u64("TRANSCRIPT_TIMEOUT_MS", 180_000)?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3333".to_string())
            .parse::<u16>()
            .map_err(|e| CallError::MissingConfiguration(format!("PORT (invalid number: {e})")))?;
        let tunnel_auth_token = env::var("NGROK_AUTHTOKEN").ok().filter(|v| !v.is_empty());
        let strict_signatures = env::var("STRICT_SIGNATURES")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);

        let public_url = OnceLock::new();
        if let Ok(url) = env::var("PUBLIC_URL")
            && !url.trim().is_empty()
        {
            let _ = public_url.set(url.trim_end_matches('/').to_string());
        }

        let config = ServerConfig {
            provider,
            carrier_account_id,
            carrier_secret,
            carrier_public_key,
            from_number,
            user_number,
            openai_api_key,
            tts_voice,
            tts_model,
            stt_model,
            stt_silence_ms,
            transcript_timeout_ms,
            port,
            tunnel_auth_token,
            strict_signatures,
            public_url,
        };

        validate(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CarrierProvider;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "PHONE_PROVIDER",
        "CARRIER_ACCOUNT_ID",
        "CARRIER_SECRET",
        "CARRIER_PUBLIC_KEY",
        "FROM_NUMBER",
        "USER_NUMBER",
        "OPENAI_API_KEY",
        "TTS_VOICE",
        "TTS_MODEL",
        "STT_MODEL",
        "STT_SILENCE_MS",
        "TRANSCRIPT_TIMEOUT_MS",
        "PORT",
        "NGROK_AUTHTOKEN",
        "STRICT_SIGNATURES",
        "PUBLIC_URL",
    ];

    // Helper to clean up environment variables after tests
    fn cleanup_env_vars() {
        unsafe {
            for key in ALL_VARS {
                env::remove_var(key);
            }
        }
    }

    fn set_required_vars() {
        unsafe {
            env::set_var("PHONE_PROVIDER", "twilio");
            env::set_var("CARRIER_ACCOUNT_ID", "AC0000000000");
            env::set_var("CARRIER_SECRET", "auth-token");
            env::set_var("FROM_NUMBER", "+15551230000");
            env::set_var("USER_NUMBER", "+15559876543");
            env::set_var("OPENAI_API_KEY", "sk-test");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        set_required_vars();

        let config = ServerConfig::from_env().expect("Should load config");
        assert_eq!(config.provider, CarrierProvider::Twilio);
        assert_eq!(config.port, 3333);
        assert_eq!(config.tts_voice, Voice::Onyx);
        assert_eq!(config.stt_silence_ms, 800);
        assert_eq!(config.transcript_timeout_ms, 180_000);
        assert!(!config.strict_signatures);
        assert!(config.public_url.get().is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_required_key() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::remove_var("OPENAI_API_KEY");
        }

        let result = ServerConfig::from_env();
        assert!(matches!(
            result,
            Err(CallError::MissingConfiguration(ref key)) if key == "OPENAI_API_KEY"
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::set_var("PHONE_PROVIDER", "telnyx");
            env::set_var("PORT", "8080");
            env::set_var("TTS_VOICE", "nova");
            env::set_var("STT_SILENCE_MS", "500");
            env::set_var("TRANSCRIPT_TIMEOUT_MS", "60000");
            env::set_var("STRICT_SIGNATURES", "yes");
            env::set_var("PUBLIC_URL", "https://example.ngrok.app/");
        }

        let config = ServerConfig::from_env().expect("Should load config");
        assert_eq!(config.provider, CarrierProvider::Telnyx);
        assert_eq!(config.port, 8080);
        assert_eq!(config.tts_voice, Voice::Nova);
        assert_eq!(config.stt_silence_ms, 500);
        assert_eq!(config.transcript_timeout_ms, 60_000);
        assert!(config.strict_signatures);
        // Trailing slash is normalized away
        assert_eq!(config.public_url().unwrap(), "https://example.ngrok.app");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_provider() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::set_var("PHONE_PROVIDER", "vonage");
        }

        assert!(ServerConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number_rejected() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::set_var("USER_NUMBER", "not-a-number");
        }

        assert!(ServerConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
