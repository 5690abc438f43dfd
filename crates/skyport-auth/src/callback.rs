//! Local HTTP listener for the OAuth redirect.
//!
//! Finishing the browser half of the login flow ends in a redirect to a
//! loopback URL. [`CallbackListener`] accepts that one request, judges the
//! redirect against the portal's callback contract, answers the browser
//! with a small status page, and hands the grant back to the controller.
//!
//! The contract is strict: the only credential accepted here is an
//! authorization code accompanied by the CSRF `state`. A provider denial
//! (`error=...`) and a redirect that tries to hand over a bare
//! `access_token` are both first-class rejections, not parse errors — the
//! token variant in particular is exactly what the server-side exchange
//! exists to avoid trusting.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{AuthError, Result};

/// Page shown in the browser when the redirect was accepted.
const DONE_PAGE: &str = "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head><meta charset=\"utf-8\"><title>skyport</title></head>\n\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4rem;\">\n\
  <h2>You are signed in</h2>\n\
  <p>Head back to the skyport terminal window. This tab can be closed.</p>\n\
</body>\n\
</html>\n";

/// Page shown in the browser when the redirect was rejected.
const REJECTED_PAGE: &str = "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head><meta charset=\"utf-8\"><title>skyport</title></head>\n\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4rem;\">\n\
  <h2>Sign-in did not complete</h2>\n\
  <p>Close this tab and try again from the skyport terminal window.</p>\n\
</body>\n\
</html>\n";

// ---------------------------------------------------------------------------
// Redirect evaluation
// ---------------------------------------------------------------------------

/// What a redirect amounted to, per the portal's callback contract.
#[derive(Debug, PartialEq, Eq)]
enum Redirect {
    /// The provider granted a code; `state` echoes our CSRF parameter.
    Granted { code: String, state: String },

    /// The provider reported a denial (`error=...`).
    Denied { error: String },

    /// The redirect tried to hand over a token directly instead of a code.
    BareToken,

    /// The redirect does not satisfy the contract.
    Invalid { reason: String },
}

impl Redirect {
    /// Judge a request target (the path-and-query part of the request line).
    fn judge(target: &str) -> Redirect {
        let query = match target.split_once('?') {
            Some((_, query)) => query,
            None => {
                return Redirect::Invalid {
                    reason: "redirect has no query string".to_string(),
                };
            }
        };

        let mut code = None;
        let mut state = None;
        let mut denial = None;
        let mut carries_token = false;

        // form_urlencoded handles percent-decoding (UTF-8) and '+' for us.
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => denial = Some(value.into_owned()),
                "access_token" => carries_token = true,
                _ => {}
            }
        }

        if let Some(error) = denial {
            return Redirect::Denied { error };
        }

        match (code, state) {
            (Some(code), Some(state)) => Redirect::Granted { code, state },
            (None, _) if carries_token => Redirect::BareToken,
            (None, _) => Redirect::Invalid {
                reason: "redirect is missing the authorization code".to_string(),
            },
            (Some(_), None) => Redirect::Invalid {
                reason: "redirect is missing the state parameter".to_string(),
            },
        }
    }

    /// Convert the judgement into the listener's result.
    fn into_grant(self) -> Result<(String, String)> {
        match self {
            Redirect::Granted { code, state } => Ok((code, state)),
            Redirect::Denied { error } => Err(AuthError::FlowFailed {
                reason: format!("provider denied the authorization: {error}"),
            }),
            Redirect::BareToken => Err(AuthError::FlowFailed {
                reason: "redirect offered a bare access_token; only codes are accepted"
                    .to_string(),
            }),
            Redirect::Invalid { reason } => Err(AuthError::FlowFailed { reason }),
        }
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// One-shot listener for the OAuth redirect.
pub struct CallbackListener;

impl CallbackListener {
    /// Bind `127.0.0.1:{port}`, wait for the redirect, and return the
    /// `(code, state)` grant.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CallbackTimeout`] if nothing arrives in time.
    /// - [`AuthError::Io`] if the port cannot be bound.
    /// - [`AuthError::FlowFailed`] for a denial, a bare-token redirect, or
    ///   a redirect missing the required parameters.
    pub async fn start(port: u16, timeout_secs: u64) -> Result<(String, String)> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;

        tracing::info!(port, "waiting for the sign-in redirect");

        let window = tokio::time::Duration::from_secs(timeout_secs);
        match tokio::time::timeout(window, Self::accept_one(&listener)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::CallbackTimeout { timeout_secs }),
        }
    }

    /// Serve a single connection: judge the redirect, answer the browser.
    async fn accept_one(listener: &TcpListener) -> Result<(String, String)> {
        let (mut stream, _) = listener.accept().await?;

        // Redirects are small GETs; one read covers the whole request.
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let redirect = match Self::request_target(&request) {
            Ok(target) => Redirect::judge(target),
            Err(reason) => Redirect::Invalid { reason },
        };

        // The browser hears about the outcome either way.
        if matches!(redirect, Redirect::Granted { .. }) {
            Self::respond(&mut stream, "200 OK", DONE_PAGE).await?;
            tracing::info!("sign-in redirect accepted");
        } else {
            Self::respond(&mut stream, "400 Bad Request", REJECTED_PAGE).await?;
            tracing::warn!(redirect = ?redirect, "sign-in redirect rejected");
        }

        redirect.into_grant()
    }

    /// Pull the request target out of the HTTP request line.
    fn request_target(request: &str) -> std::result::Result<&str, String> {
        let request_line = request
            .lines()
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| "empty request".to_string())?;

        let mut words = request_line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("GET"), Some(target)) => Ok(target),
            (Some(method), Some(_)) => Err(format!("unexpected {method} request")),
            _ => Err(format!("malformed request line: {request_line}")),
        }
    }

    async fn respond(stream: &mut TcpStream, status: &str, page: &str) -> Result<()> {
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
            page.len()
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn judge(target: &str) -> Redirect {
        Redirect::judge(target)
    }

    #[test]
    fn code_and_state_are_granted() {
        let redirect = judge("/callback?code=abc123&state=f3b1");
        assert_eq!(
            redirect,
            Redirect::Granted {
                code: "abc123".to_string(),
                state: "f3b1".to_string(),
            }
        );
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let redirect = judge("/callback?state=f3b1&code=abc123");
        let (code, state) = redirect.into_grant().unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state, "f3b1");
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let (code, _) = judge("/callback?code=abc&state=s&prompt=none&iss=campus")
            .into_grant()
            .unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn provider_denial_is_first_class() {
        let redirect = judge("/callback?error=access_denied&state=f3b1");
        assert_eq!(
            redirect,
            Redirect::Denied {
                error: "access_denied".to_string()
            }
        );

        let err = redirect.into_grant().unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn denial_wins_even_when_a_code_is_present() {
        // A provider that sends both is reporting a failure; believe it.
        let redirect = judge("/callback?code=abc&state=s&error=server_error");
        assert!(matches!(redirect, Redirect::Denied { .. }));
    }

    #[test]
    fn bare_token_redirect_is_refused() {
        let redirect = judge("/callback?access_token=tok_direct&state=f3b1");
        assert_eq!(redirect, Redirect::BareToken);

        let err = redirect.into_grant().unwrap_err();
        assert!(err.to_string().contains("bare access_token"));
    }

    #[test]
    fn stray_token_next_to_a_code_is_dropped() {
        let (code, state) = judge("/callback?code=abc&access_token=tok&state=f3b1")
            .into_grant()
            .unwrap();
        assert_eq!(code, "abc");
        assert_eq!(state, "f3b1");
    }

    #[test]
    fn missing_code_is_invalid() {
        assert!(matches!(
            judge("/callback?state=f3b1"),
            Redirect::Invalid { .. }
        ));
    }

    #[test]
    fn missing_state_is_invalid() {
        assert!(matches!(
            judge("/callback?code=abc123"),
            Redirect::Invalid { .. }
        ));
    }

    #[test]
    fn bare_path_is_invalid() {
        assert!(matches!(judge("/callback"), Redirect::Invalid { .. }));
    }

    #[test]
    fn percent_encoding_decodes_as_utf8() {
        // Codes are ASCII in practice, but the decoder must not mangle
        // multibyte values into per-byte garbage.
        let (code, state) = judge("/callback?code=a%2Fb%20c&state=caf%C3%A9")
            .into_grant()
            .unwrap();
        assert_eq!(code, "a/b c");
        assert_eq!(state, "café");
    }

    #[test]
    fn plus_decodes_to_space() {
        let (code, _) = judge("/callback?code=a+b&state=s").into_grant().unwrap();
        assert_eq!(code, "a b");
    }

    #[test]
    fn request_target_extraction() {
        let target =
            CallbackListener::request_target("GET /cb?code=a&state=s HTTP/1.1\r\nHost: x\r\n\r\n")
                .unwrap();
        assert_eq!(target, "/cb?code=a&state=s");

        assert!(CallbackListener::request_target("").is_err());
        assert!(CallbackListener::request_target("POST /cb HTTP/1.1\r\n\r\n").is_err());
        assert!(CallbackListener::request_target("garbage").is_err());
    }

    async fn send_redirect(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn accepted_redirect_yields_grant_and_done_page() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let browser =
            tokio::spawn(async move { send_redirect(port, "/callback?code=abc123&state=f3b1").await });

        let (code, state) = CallbackListener::accept_one(&listener).await.unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state, "f3b1");

        let response = browser.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("You are signed in"));
    }

    #[tokio::test]
    async fn rejected_redirect_gets_an_error_page() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let browser =
            tokio::spawn(async move { send_redirect(port, "/callback?access_token=tok&state=s").await });

        let result = CallbackListener::accept_one(&listener).await;
        assert!(matches!(result, Err(AuthError::FlowFailed { .. })));

        let response = browser.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
        assert!(response.contains("did not complete"));
    }

    #[tokio::test]
    async fn silence_times_out() {
        let result = CallbackListener::start(0, 1).await;
        match result {
            Err(AuthError::CallbackTimeout { timeout_secs }) => assert_eq!(timeout_secs, 1),
            Err(AuthError::Io(_)) => {}
            other => panic!("expected a timeout, got: {other:?}"),
        }
    }
}
