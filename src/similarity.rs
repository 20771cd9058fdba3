//! Content and DOM-structure similarity fingerprints
//!
//! Implements 64-bit SimHash over whitespace tokens (textual similarity)
//! and over 3-gram shingles of the document's tag sequence (structural
//! similarity). Two pages whose tag sequences match fingerprint identically
//! regardless of their text, which is what crawl deduplication needs when
//! comparing an HTTP-fetched shell against its JS-rendered sibling.

use xxhash_rust::xxh3::xxh3_64;

/// A 64-bit locality-sensitive fingerprint.
///
/// Identical inputs always produce identical fingerprints; similar inputs
/// produce fingerprints with a small Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Fingerprint a text by its whitespace-separated tokens.
    /// Empty input (no tokens) yields the zero fingerprint.
    pub fn of_text(text: &str) -> Self {
        Fingerprint(compute(text.split_whitespace()))
    }

    /// Fingerprint the structure of an HTML document.
    ///
    /// Collects start-tag names in document order, forms 3-gram shingles
    /// joined by `_`, and SimHashes the shingle sequence. Documents with
    /// fewer than three tags fall back to hashing the tag sequence itself;
    /// documents with no tags at all yield the zero fingerprint.
    pub fn of_dom(html: &str) -> Self {
        let tags = extract_tags(html);
        if tags.is_empty() {
            return Fingerprint(0);
        }

        let shingles = make_shingles(&tags, 3);
        if shingles.is_empty() {
            return Self::of_text(&tags.join(" "));
        }
        Self::of_text(&shingles.join(" "))
    }

    /// Hamming distance between two fingerprints.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// True if the Hamming distance is within `max_distance`.
    pub fn is_similar(&self, other: &Fingerprint, max_distance: u32) -> bool {
        self.distance(other) <= max_distance
    }

    /// Render as a fixed-width hex string for JSON transport (u64 does not
    /// survive a round-trip through JSON number precision).
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

/// Compute a SimHash from an iterator of string features.
///
/// Each feature is hashed with xxh3 and its bits are accumulated in a
/// 64-element vote array; the final hash sets each bit position where more
/// features voted 1 than 0.
fn compute<'a>(features: impl Iterator<Item = &'a str>) -> u64 {
    let mut votes = [0i32; 64];
    let mut has_features = false;

    for feature in features {
        has_features = true;
        let hash = xxh3_64(feature.as_bytes());
        for (i, vote) in votes.iter_mut().enumerate() {
            if (hash >> i) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }

    if !has_features {
        return 0;
    }

    let mut fingerprint: u64 = 0;
    for (i, vote) in votes.iter().enumerate() {
        if *vote > 0 {
            fingerprint |= 1u64 << i;
        }
    }
    fingerprint
}

/// Collect start-tag and self-closing-tag names in document order.
///
/// A lightweight scan rather than a full tree build: tree builders insert
/// implied `<html>`/`<head>`/`<body>` elements, which would give tag-free
/// input a non-empty sequence. End tags, comments, doctype, and processing
/// instructions are skipped; `<script>`/`<style>` bodies are skipped so
/// embedded `<` characters cannot masquerade as tags.
fn extract_tags(html: &str) -> Vec<String> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(lt) = html[pos..].find('<') else {
            break;
        };
        let start = pos + lt + 1;
        if start >= bytes.len() {
            break;
        }

        // Comments: skip to the closing marker.
        if html[start..].starts_with("!--") {
            match html[start..].find("-->") {
                Some(end) => {
                    pos = start + end + 3;
                    continue;
                }
                None => break,
            }
        }

        // End tags, doctype, processing instructions: skip past '>'.
        let c = bytes[start];
        if c == b'/' || c == b'!' || c == b'?' {
            match html[start..].find('>') {
                Some(end) => {
                    pos = start + end + 1;
                    continue;
                }
                None => break,
            }
        }

        if !c.is_ascii_alphabetic() {
            pos = start;
            continue;
        }

        let mut end = start;
        while end < bytes.len()
            && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'-')
        {
            end += 1;
        }
        let name = html[start..end].to_ascii_lowercase();

        pos = match html[end..].find('>') {
            Some(gt) => end + gt + 1,
            None => break,
        };

        // Raw-text elements: fast-forward past the matching close tag.
        if name == "script" || name == "style" {
            let close = format!("</{name}");
            match html[pos..].to_ascii_lowercase().find(&close) {
                Some(off) => {
                    let after = pos + off;
                    pos = match html[after..].find('>') {
                        Some(gt) => after + gt + 1,
                        None => break,
                    };
                }
                None => {
                    tags.push(name);
                    break;
                }
            }
        }

        tags.push(name);
    }

    tags
}

/// Build n-gram shingles joined by `_`. Returns empty if there are fewer
/// than `n` tokens.
fn make_shingles(tokens: &[String], n: usize) -> Vec<String> {
    if tokens.len() < n {
        return Vec::new();
    }
    tokens.windows(n).map(|w| w.join("_")).collect()
}
