//! cURL import/export - translate between drafts and curl command lines

use anyhow::{anyhow, Result};
use base64::Engine;

use crate::models::{Header, HttpMethod, Request, RequestDraft};

/// Parse a cURL command into a draft
pub fn parse_curl(input: &str) -> Result<RequestDraft> {
    let mut draft = RequestDraft {
        headers: Vec::new(),
        ..RequestDraft::default()
    };

    // Remove line continuations and normalize
    let normalized = input.replace("\\\r\n", " ").replace("\\\n", " ");

    let mut tokens = tokenize(&normalized)?;

    // Skip 'curl' command if present
    if tokens.first().map(|s| s.as_str()) == Some("curl") {
        tokens.remove(0);
    }

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];

        match token.as_str() {
            "-X" | "--request" => {
                if i + 1 < tokens.len() {
                    draft.method = HttpMethod::parse(&tokens[i + 1]);
                    i += 1;
                }
            }
            "-H" | "--header" => {
                if i + 1 < tokens.len() {
                    draft.headers.push(parse_header(&tokens[i + 1])?);
                    i += 1;
                }
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" => {
                if i + 1 < tokens.len() {
                    draft.body = tokens[i + 1].clone();
                    // Infer POST if not set
                    if draft.method == HttpMethod::GET {
                        draft.method = HttpMethod::POST;
                    }
                    i += 1;
                }
            }
            "-u" | "--user" => {
                if i + 1 < tokens.len() {
                    let encoded = base64::engine::general_purpose::STANDARD
                        .encode(&tokens[i + 1]);
                    draft
                        .headers
                        .push(Header::new("Authorization", format!("Basic {encoded}")));
                    i += 1;
                }
            }
            "--compressed" | "-k" | "--insecure" | "-L" | "--location" | "-s" | "--silent"
            | "-v" | "--verbose" => {
                // Ignored flags
            }
            _ => {
                // Bare token that looks like a URL
                if !token.starts_with('-')
                    && (token.starts_with("http://") || token.starts_with("https://"))
                {
                    draft.url = token.clone();
                }
            }
        }
        i += 1;
    }

    if draft.url.is_empty() {
        return Err(anyhow!("no URL found in curl command"));
    }
    Ok(draft)
}

fn parse_header(s: &str) -> Result<Header> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid header format: {}", s))?;
    Ok(Header::new(name.trim(), value.trim()))
}

/// Tokenize a curl command, respecting quotes
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            current.push(c);
            escape_next = false;
            continue;
        }

        match c {
            '\\' if !in_single_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ' ' | '\t' | '\n' if !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
            }
            _ => {
                current.push(c);
            }
        }
    }

    if in_single_quote || in_double_quote {
        return Err(anyhow!("unbalanced quotes in curl command"));
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Format a request as a cURL command
pub fn to_curl(request: &Request) -> String {
    let mut parts = vec!["curl".to_string()];

    // Method
    if request.method != HttpMethod::GET {
        parts.push(format!("-X {}", request.method.as_str()));
    }

    // URL
    parts.push(format!("'{}'", request.url));

    // Headers
    for header in &request.headers {
        parts.push(format!("-H '{}: {}'", header.name, header.value));
    }

    // Body
    if let Some(body) = &request.body {
        if !body.is_empty() {
            let text = String::from_utf8_lossy(body);
            parts.push(format!("-d '{}'", text.replace('\'', "'\\''")));
        }
    }

    parts.join(" \\\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let curl = "curl https://api.example.com/users";
        let draft = parse_curl(curl).unwrap();
        assert_eq!(draft.url, "https://api.example.com/users");
        assert_eq!(draft.method, HttpMethod::GET);
    }

    #[test]
    fn test_parse_post_with_data() {
        let curl = r#"curl -X POST -H "Content-Type: application/json" -d '{"name":"test"}' https://api.example.com/users"#;
        let draft = parse_curl(curl).unwrap();
        assert_eq!(draft.method, HttpMethod::POST);
        assert_eq!(draft.body, r#"{"name":"test"}"#);
        assert_eq!(
            draft.headers,
            vec![Header::new("Content-Type", "application/json")]
        );
    }

    #[test]
    fn test_parse_custom_method() {
        let draft = parse_curl("curl -X PURGE https://cache.example.com/key").unwrap();
        assert_eq!(draft.method, HttpMethod::Custom("PURGE".to_string()));
    }

    #[test]
    fn test_parse_basic_auth_becomes_header() {
        let draft = parse_curl("curl -u alice:secret https://api.example.com").unwrap();
        let auth = draft.headers.iter().find(|h| h.name == "Authorization");
        assert_eq!(auth.unwrap().value, "Basic YWxpY2U6c2VjcmV0");
    }

    #[test]
    fn test_parse_rejects_missing_url() {
        assert!(parse_curl("curl -X GET").is_err());
    }

    #[test]
    fn test_to_curl_roundtrip() {
        let curl = "curl -X POST -H 'Accept: */*' -d '{\"a\":1}' https://api.example.com/x";
        let draft = parse_curl(curl).unwrap();
        let exported = to_curl(&draft.freeze());
        let reparsed = parse_curl(&exported).unwrap();
        assert_eq!(reparsed.url, draft.url);
        assert_eq!(reparsed.body, draft.body);
        assert_eq!(reparsed.headers, draft.headers);
    }
}
