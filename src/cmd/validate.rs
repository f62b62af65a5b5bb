//! `api-proxy validate`: check the upstream settings without starting.
//!
//! Runs the same validation as `run` and reports the result in either
//! human-readable text or machine-readable JSON format.

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::validation;
use crate::error::ApiProxyError;

pub fn execute(args: &ValidateArgs) -> Result<(), ApiProxyError> {
    match validation::validate(&args.upstream) {
        Ok(url) => {
            match args.format {
                ValidateFormat::Text => {
                    println!(
                        "\u{2713} {}",
                        validation::format_validation_report(&args.upstream, &url)
                    );
                }
                ValidateFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "valid": true,
                            "upstream": args.upstream.upstream_url,
                            "transport": url.scheme(),
                            "keep_alive": args.upstream.keep_alive,
                            "timeout_ms": args.upstream.timeout,
                        })
                    );
                }
            }
            Ok(())
        }
        Err(errors) => {
            match args.format {
                ValidateFormat::Text => {
                    eprintln!("\u{2717} settings have {} errors\n", errors.len());
                    for error in &errors {
                        eprintln!("{error}");
                    }
                }
                ValidateFormat::Json => {
                    let json_errors: Vec<serde_json::Value> = errors
                        .iter()
                        .map(|e| {
                            serde_json::json!({
                                "field": e.field,
                                "message": e.message,
                                "suggestion": e.suggestion,
                            })
                        })
                        .collect();
                    println!(
                        "{}",
                        serde_json::json!({
                            "valid": false,
                            "errors": json_errors,
                        })
                    );
                }
            }
            Err(ApiProxyError::ConfigValidation { errors })
        }
    }
}
