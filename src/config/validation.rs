use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("jobs.max_age_secs must be positive")]
    ZeroJobMaxAge,

    #[error("jobs.max_title_chars must be positive")]
    ZeroTitleLimit,

    #[error("{field} must name an executable")]
    EmptyBinary { field: &'static str },

    #[error("server.download_dir must not be empty")]
    EmptyDownloadDir,

    #[error("resolver.concurrent_fragments must be positive")]
    ZeroFragments,

    #[error("transcoder.audio_bitrate_kbps must be positive")]
    ZeroAudioBitrate,

    #[error("relay timeouts must be positive: {field} = 0")]
    ZeroRelayTimeout { field: &'static str },

    #[error("GIF settings must be positive: {field} = {value}")]
    InvalidGifSetting { field: &'static str, value: u32 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_jobs(config)?;
    validate_resolver(config)?;
    validate_transcoder(config)?;
    validate_relay(config)?;
    Ok(())
}

fn validate_relay(config: &Config) -> Result<(), ValidationError> {
    if config.relay.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroRelayTimeout {
            field: "relay.connect_timeout_secs",
        });
    }
    if config.relay.image_timeout_secs == 0 {
        return Err(ValidationError::ZeroRelayTimeout {
            field: "relay.image_timeout_secs",
        });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.download_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyDownloadDir);
    }
    Ok(())
}

fn validate_jobs(config: &Config) -> Result<(), ValidationError> {
    if config.jobs.max_age_secs == 0 {
        return Err(ValidationError::ZeroJobMaxAge);
    }
    if config.jobs.max_title_chars == 0 {
        return Err(ValidationError::ZeroTitleLimit);
    }
    Ok(())
}

fn validate_resolver(config: &Config) -> Result<(), ValidationError> {
    if config.resolver.binary.trim().is_empty() {
        return Err(ValidationError::EmptyBinary {
            field: "resolver.binary",
        });
    }
    if config.resolver.concurrent_fragments == 0 {
        return Err(ValidationError::ZeroFragments);
    }
    Ok(())
}

fn validate_transcoder(config: &Config) -> Result<(), ValidationError> {
    let transcoder = &config.transcoder;

    if transcoder.binary.trim().is_empty() {
        return Err(ValidationError::EmptyBinary {
            field: "transcoder.binary",
        });
    }

    if transcoder.audio_bitrate_kbps == 0 {
        return Err(ValidationError::ZeroAudioBitrate);
    }

    if transcoder.gif_fps == 0 {
        return Err(ValidationError::InvalidGifSetting {
            field: "gif_fps",
            value: 0,
        });
    }

    if transcoder.gif_width == 0 {
        return Err(ValidationError::InvalidGifSetting {
            field: "gif_width",
            value: 0,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_max_age() {
        let mut config = Config::default();
        config.jobs.max_age_secs = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::ZeroJobMaxAge)));
    }

    #[test]
    fn test_empty_resolver_binary() {
        let mut config = Config::default();
        config.resolver.binary = "  ".to_string();

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::EmptyBinary {
                field: "resolver.binary"
            })
        ));
    }

    #[test]
    fn test_zero_relay_timeout() {
        let mut config = Config::default();
        config.relay.image_timeout_secs = 0;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::ZeroRelayTimeout {
                field: "relay.image_timeout_secs"
            })
        ));
    }

    #[test]
    fn test_zero_fragments() {
        let mut config = Config::default();
        config.resolver.concurrent_fragments = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::ZeroFragments)));
    }

    #[test]
    fn test_zero_gif_width() {
        let mut config = Config::default();
        config.transcoder.gif_width = 0;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidGifSetting {
                field: "gif_width",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_audio_bitrate() {
        let mut config = Config::default();
        config.transcoder.audio_bitrate_kbps = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::ZeroAudioBitrate)));
    }
}
