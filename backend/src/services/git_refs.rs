//! Tag listing over the git smart-HTTP protocol.
//!
//! `GET {repo}.git/info/refs?service=git-upload-pack` returns a pkt-line
//! encoded ref advertisement. Each pkt-line starts with a four-hex-digit
//! length that includes the prefix itself; `0000` is a flush packet. The
//! first ref line carries capabilities after a NUL byte. Annotated tags
//! appear twice: once as `refs/tags/X` and once peeled as `refs/tags/X^{}`.

use crate::error::{AppError, Result};

const TAG_PREFIX: &str = "refs/tags/";
const PEELED_SUFFIX: &str = "^{}";

/// Extract tag names, in advertisement order, without duplicates.
pub fn parse_tag_advertisement(body: &[u8]) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        if body.len() - pos < 4 {
            return Err(AppError::ManifestParse(
                "truncated pkt-line length in ref advertisement".into(),
            ));
        }
        let len_hex = std::str::from_utf8(&body[pos..pos + 4])
            .map_err(|_| AppError::ManifestParse("non-ascii pkt-line length".into()))?;
        let len = usize::from_str_radix(len_hex, 16)
            .map_err(|_| AppError::ManifestParse(format!("bad pkt-line length {:?}", len_hex)))?;

        // flush / delim packets
        if len < 4 {
            pos += 4;
            continue;
        }
        if pos + len > body.len() {
            return Err(AppError::ManifestParse(
                "pkt-line exceeds ref advertisement body".into(),
            ));
        }

        let payload = &body[pos + 4..pos + len];
        pos += len;

        let line = String::from_utf8_lossy(payload);
        let line = line.trim_end_matches('\n');
        let line = line.split('\0').next().unwrap_or_default();
        if line.starts_with('#') {
            continue;
        }

        let Some((_sha, refname)) = line.split_once(' ') else {
            continue;
        };
        let Some(tag) = refname.strip_prefix(TAG_PREFIX) else {
            continue;
        };
        let tag = tag.strip_suffix(PEELED_SUFFIX).unwrap_or(tag);
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(line: &str) -> String {
        format!("{:04x}{}", line.len() + 4, line)
    }

    fn advertisement(lines: &[&str]) -> Vec<u8> {
        let mut out = pkt("# service=git-upload-pack\n");
        out.push_str("0000");
        for line in lines {
            out.push_str(&pkt(line));
        }
        out.push_str("0000");
        out.into_bytes()
    }

    #[test]
    fn test_lightweight_and_annotated_tags() {
        let body = advertisement(&[
            "1111111111111111111111111111111111111111 HEAD\0multi_ack side-band-64k\n",
            "1111111111111111111111111111111111111111 refs/heads/main\n",
            "2222222222222222222222222222222222222222 refs/tags/v1.0.0\n",
            "3333333333333333333333333333333333333333 refs/tags/v1.1.0\n",
            "4444444444444444444444444444444444444444 refs/tags/v1.1.0^{}\n",
        ]);
        let tags = parse_tag_advertisement(&body).unwrap();
        assert_eq!(tags, vec!["v1.0.0", "v1.1.0"]);
    }

    #[test]
    fn test_no_tags() {
        let body = advertisement(&[
            "1111111111111111111111111111111111111111 refs/heads/main\0agent=git/2\n",
        ]);
        assert!(parse_tag_advertisement(&body).unwrap().is_empty());
    }

    #[test]
    fn test_first_ref_with_capabilities_is_a_tag() {
        let body = advertisement(&[
            "2222222222222222222222222222222222222222 refs/tags/1.0.0\0multi_ack\n",
        ]);
        assert_eq!(parse_tag_advertisement(&body).unwrap(), vec!["1.0.0"]);
    }

    #[test]
    fn test_truncated_body_is_error() {
        let mut body = advertisement(&["2222222222222222222222222222222222222222 refs/tags/a\n"]);
        body.truncate(body.len() - 10);
        assert!(parse_tag_advertisement(&body).is_err());
    }

    #[test]
    fn test_empty_body() {
        assert!(parse_tag_advertisement(b"").unwrap().is_empty());
    }
}
