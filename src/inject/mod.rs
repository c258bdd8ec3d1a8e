//! HTML rewriting: splices the reload client into served or proxied pages.
//!
//! The snippet is inserted immediately before the last closing body tag.
//! Content without one is passed through untouched; a broken page is
//! worse than a page that does not auto-reload.

use std::borrow::Cow;
use std::ops::Range;

/// Reload client, spliced into HTML pages. `__EPOCH__` is replaced with
/// the current epoch at injection time.
const CLIENT_SNIPPET: &str = include_str!("client.html");

/// Rewrites HTML to carry the reload client.
pub struct Injector {
    active: bool,
}

impl Injector {
    /// `active` is false when nothing is watched; injection is then a
    /// feature no-op since reload is meaningless with nothing to watch.
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Splice the reload client, parameterized with `epoch`, immediately
    /// before the last closing body tag. Everything before and after the
    /// tag is preserved verbatim.
    pub fn inject<'a>(&self, html: &'a str, epoch: &str) -> Cow<'a, str> {
        if !self.active {
            return Cow::Borrowed(html);
        }

        let Some(tag) = find_last_body_close(html) else {
            tracing::warn!("Found no body close tag, serving page unmodified");
            return Cow::Borrowed(html);
        };

        let snippet = CLIENT_SNIPPET.replace("__EPOCH__", epoch);
        let mut out = String::with_capacity(html.len() + snippet.len());
        out.push_str(&html[..tag.start]);
        out.push_str(&snippet);
        out.push_str(&html[tag.start..]);
        Cow::Owned(out)
    }
}

/// Locate the last closing body tag: case-insensitive, with arbitrary
/// whitespace around the slash and the tag name (`< / BODY >` matches).
fn find_last_body_close(html: &str) -> Option<Range<usize>> {
    let bytes = html.as_bytes();
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if let Some(end) = match_body_close(bytes, i) {
                found = Some(i..end);
                i = end;
                continue;
            }
        }
        i += 1;
    }
    found
}

/// Match `</body>` (whitespace-tolerant) starting at the `<` at `start`;
/// returns the index just past the `>`.
fn match_body_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    i = skip_ws(bytes, i);
    if bytes.get(i) != Some(&b'/') {
        return None;
    }
    i = skip_ws(bytes, i + 1);
    for expected in b"body" {
        if !bytes.get(i)?.eq_ignore_ascii_case(expected) {
            return None;
        }
        i += 1;
    }
    i = skip_ws(bytes, i);
    if bytes.get(i) != Some(&b'>') {
        return None;
    }
    Some(i + 1)
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
        i += 1;
    }
    i
}
