use crate::http::HttpClient;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

static ICON_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel][href]").expect("static selector"));

/// Resolve the favicon URL for a page: the first `<link rel="...icon...">`
/// href joined against the page URL, falling back to `/favicon.ico` at the
/// site root.
pub fn favicon_url(page_url: &str, body: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let doc = Html::parse_document(body);
    for el in doc.select(&ICON_LINK_SELECTOR) {
        let rel = el.value().attr("rel").unwrap_or_default();
        if !rel.to_ascii_lowercase().contains("icon") {
            continue;
        }
        if let Some(href) = el.value().attr("href") {
            if let Ok(joined) = base.join(href) {
                return Some(joined.into());
            }
        }
    }
    base.join("/favicon.ico").ok().map(Into::into)
}

/// Fetch the site favicon and return its content hash. Best-effort: any
/// failure (no URL, transport error, non-200, empty body) yields 0.
pub async fn fetch_favicon_hash(client: &HttpClient, page_url: &str, body: &str) -> i32 {
    let Some(url) = favicon_url(page_url, body) else {
        return 0;
    };
    match client.get(&url, None).await {
        Ok(resp) if resp.status_code == 200 && !resp.body.is_empty() => favicon_hash(&resp.body),
        Ok(resp) => {
            debug!(url = %url, status = resp.status_code, "favicon fetch returned no usable body");
            0
        }
        Err(e) => {
            debug!(url = %url, error = %e, "favicon fetch failed");
            0
        }
    }
}

/// Shodan-compatible favicon hash: murmur3 (32-bit, seed 0) over the
/// MIME-wrapped base64 encoding of the icon bytes.
pub fn favicon_hash(data: &[u8]) -> i32 {
    if data.is_empty() {
        return 0;
    }
    murmur3_32(base64_mime(data).as_bytes(), 0) as i32
}

/// Standard-alphabet base64 with a line break every 76 characters and a
/// trailing newline, matching the encoding the fingerprint corpus hashes.
fn base64_mime(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut raw = Vec::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        raw.push(ALPHABET[(n >> 18) as usize & 63]);
        raw.push(ALPHABET[(n >> 12) as usize & 63]);
        raw.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6) as usize & 63]
        } else {
            b'='
        });
        raw.push(if chunk.len() > 2 {
            ALPHABET[n as usize & 63]
        } else {
            b'='
        });
    }
    let mut out = String::with_capacity(raw.len() + raw.len() / 76 + 2);
    for line in raw.chunks(76) {
        out.push_str(std::str::from_utf8(line).expect("base64 is ascii"));
        out.push('\n');
    }
    out
}

/// MurmurHash3 x86 32-bit.
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h = (h ^ k).rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k |= u32::from(byte) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur3_reference_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
        assert_eq!(
            murmur3_32(b"The quick brown fox jumps over the lazy dog", 0),
            0x2e4f_f723
        );
    }

    #[test]
    fn base64_pads_and_wraps() {
        assert_eq!(base64_mime(b"hello"), "aGVsbG8=\n");
        let long = vec![0u8; 60]; // 80 base64 chars -> wrapped at 76
        let encoded = base64_mime(&long);
        let lines: Vec<&str> = encoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
    }

    #[test]
    fn empty_favicon_hashes_to_zero() {
        assert_eq!(favicon_hash(b""), 0);
    }

    #[test]
    fn hash_is_stable_for_same_bytes() {
        let icon = b"\x00\x01\x02icon-bytes";
        assert_eq!(favicon_hash(icon), favicon_hash(icon));
        assert_ne!(favicon_hash(icon), 0);
    }

    #[test]
    fn favicon_url_prefers_link_tag() {
        let body = r#"<html><head><link rel="shortcut icon" href="/static/fav.png"></head></html>"#;
        assert_eq!(
            favicon_url("http://example.com/app", body),
            Some("http://example.com/static/fav.png".to_string())
        );
    }

    #[test]
    fn favicon_url_falls_back_to_root_ico() {
        assert_eq!(
            favicon_url("http://example.com/deep/path", "<html></html>"),
            Some("http://example.com/favicon.ico".to_string())
        );
    }
}
