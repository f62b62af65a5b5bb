//! Validation of the upstream settings with detailed error reporting.
//!
//! [`validate`] checks the upstream URL (parseable, `http`/`https`, has a
//! host) and the timeout, collecting every problem as a
//! [`ValidationError`] with a suggestion where one helps.

use url::Url;

use crate::cli::UpstreamArgs;
use crate::error::ValidationError;

/// Validate the upstream URL. Returns the parsed URL or a human-readable error.
pub fn validate_upstream_url(url: &str) -> Result<Url, (String, Option<String>)> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Err((
                format!("'{url}' is not an absolute URL"),
                Some(format!("did you mean 'http://{url}'?")),
            ));
        }
        Err(e) => return Err((format!("'{url}' is not a valid URL: {e}"), None)),
    };

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err((
            format!("unsupported scheme '{scheme}'"),
            Some("use http:// or https://".into()),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err((format!("'{url}' has no host"), None));
    }
    Ok(parsed)
}

pub fn validate(args: &UpstreamArgs) -> Result<Url, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let url = match validate_upstream_url(&args.upstream_url) {
        Ok(url) => Some(url),
        Err((message, suggestion)) => {
            errors.push(ValidationError {
                field: "upstream_url".into(),
                message,
                suggestion,
            });
            None
        }
    };

    if args.timeout == 0 {
        errors.push(ValidationError {
            field: "timeout".into(),
            message: "must be greater than zero".into(),
            suggestion: Some("the default is 30000 ms".into()),
        });
    }

    match url {
        Some(url) if errors.is_empty() => Ok(url),
        _ => Err(errors),
    }
}

/// One-line summary of validated settings.
#[must_use]
pub fn format_validation_report(args: &UpstreamArgs, url: &Url) -> String {
    let transport = if url.scheme() == "https" {
        "https"
    } else {
        "http"
    };
    let pooling = if args.keep_alive {
        "keep-alive on"
    } else {
        "keep-alive off"
    };
    format!(
        "{} is valid ({transport} transport, {pooling}, timeout {}ms)",
        args.upstream_url, args.timeout
    )
}
