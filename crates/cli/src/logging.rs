use engine::config::LoggingConfig;
use regex::Regex;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Always applied when redaction is enabled, ahead of configured patterns.
const BUILTIN_PATTERNS: [(&str, &str); 3] = [
    (r"(?i)bearer\s+[A-Za-z0-9\-_.=]+", "Bearer [REDACTED]"),
    (
        r"eyJ[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]*",
        "[REDACTED_JWT]",
    ),
    (
        r#"(?i)("?(?:password|currentPassword|newPassword|refreshToken|accessToken)"?\s*[:=]\s*)"[^"]*""#,
        r#"$1"[REDACTED]""#,
    ),
];

struct RedactingWriter<W> {
    inner: W,
    patterns: Vec<(Regex, String)>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let mut redacted = s.to_string();
        for (re, replacement) in &self.patterns {
            redacted = re.replace_all(&redacted, replacement.as_str()).to_string();
        }
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter {
    patterns: Vec<(Regex, String)>,
}

impl<'a> fmt::MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stderr>;

    fn make_writer(&self) -> Self::Writer {
        RedactingWriter {
            inner: io::stderr(),
            patterns: self.patterns.clone(),
        }
    }
}

fn redaction_patterns(config: &LoggingConfig) -> Vec<(Regex, String)> {
    if !config.redaction.enabled {
        return Vec::new();
    }
    let builtin = BUILTIN_PATTERNS
        .iter()
        .map(|(re, placeholder)| (re.to_string(), placeholder.to_string()));
    let configured = config
        .redaction
        .patterns
        .iter()
        .map(|p| (p.regex.clone(), p.placeholder.clone()));

    let mut patterns = Vec::new();
    for (re, placeholder) in builtin.chain(configured) {
        match Regex::new(&re) {
            Ok(re) => patterns.push((re, placeholder)),
            Err(e) => eprintln!("warning: ignoring invalid redaction pattern {}: {}", re, e),
        }
    }
    patterns
}

/// `RUST_LOG` wins over the configured level; `verbose` forces debug.
pub fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.levels.directive()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let make_writer = RedactingMakeWriter {
        patterns: redaction_patterns(config),
    };

    let show_target = config.format.show_target;
    let show_file = config.format.show_file;
    let show_line = config.format.show_line;

    // Layer::boxed() unifies the branch types
    let fmt_layer = match (config.json, config.format.show_time) {
        (true, _) => fmt::layer()
            .json()
            .with_writer(make_writer)
            .with_target(show_target)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed(),
        (false, true) => fmt::layer()
            .with_writer(make_writer)
            .with_target(show_target)
            .with_file(show_file)
            .with_line_number(show_line)
            .with_thread_ids(false)
            .boxed(),
        (false, false) => fmt::layer()
            .with_writer(make_writer)
            .with_target(show_target)
            .with_file(show_file)
            .with_line_number(show_line)
            .with_thread_ids(false)
            .without_time()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> LoggingConfig {
        engine::EngineConfig::defaults().unwrap().logging
    }

    fn redact(input: &str, config: &LoggingConfig) -> String {
        let mut out = Vec::new();
        let mut writer = RedactingWriter {
            inner: &mut out,
            patterns: redaction_patterns(config),
        };
        writer.write_all(input.as_bytes()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_redacts_bearer_and_jwt() {
        let line = "auth header Bearer abc.def-123 token=eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig";
        let out = redact(line, &config());
        assert!(out.contains("Bearer [REDACTED]"));
        assert!(!out.contains("abc.def-123"));
        assert!(out.contains("[REDACTED_JWT]"));
        assert!(!out.contains("eyJzdWIiOiIxIn0"));
    }

    #[test]
    fn test_redacts_password_fields() {
        let out = redact(r#"body {"username":"jo","password":"Geheim123"}"#, &config());
        assert!(out.contains(r#""password":"[REDACTED]""#));
        assert!(out.contains(r#""username":"jo""#));
    }

    #[test]
    fn test_disabled_redaction_passes_through() {
        let mut config = config();
        config.redaction.enabled = false;
        let line = "Bearer abc";
        assert_eq!(redact(line, &config), line);
    }

    #[test]
    fn test_configured_pattern_applies() {
        let mut config = config();
        config.redaction.patterns.push(engine::config::RedactionPattern {
            name: "api_key".into(),
            regex: r"X-API-Key: \S+".into(),
            placeholder: "X-API-Key: [REDACTED]".into(),
        });
        let out = redact("X-API-Key: s3cr3t", &config);
        assert_eq!(out, "X-API-Key: [REDACTED]");
    }
}
