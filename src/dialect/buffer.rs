//! Streaming core primitives shared by every dialect state machine.
//!
//! These three functions are the load-bearing pieces of the whole parser
//! framework: they decide, byte by byte, how much of a growable buffer is
//! safe to hand to the caller as content/thinking text versus how much must
//! be withheld because it could still turn into (the start of) a sentinel.

/// Returns the largest `k` such that the last `k` bytes of `buffer` are a
/// prefix of `sentinel`.
///
/// Linear in `sentinel.len()`. `k` is capped at `buffer.len()` and at
/// `sentinel.len()` (a full match only withholds the sentinel's own length,
/// never more).
pub fn overlap(buffer: &[u8], sentinel: &[u8]) -> usize {
    let max_k = buffer.len().min(sentinel.len());
    for k in (1..=max_k).rev() {
        if buffer[buffer.len() - k..] == sentinel[..k] {
            return k;
        }
    }
    0
}

/// Returns the largest overlap across every candidate sentinel.
pub fn max_overlap(buffer: &[u8], sentinels: &[&[u8]]) -> usize {
    sentinels.iter().map(|s| overlap(buffer, s)).max().unwrap_or(0)
}

/// Returns the number of trailing bytes in `buffer` that form Unicode
/// whitespace, scanning backward from the end one `char` at a time.
///
/// Sentinels are frequently preceded by a newline the model inserts for
/// readability; treating trailing whitespace as ambiguous avoids emitting
/// that newline only to discover a control tag immediately follows it.
pub fn trailing_whitespace_len(buffer: &[u8]) -> usize {
    let text = match std::str::from_utf8(buffer) {
        Ok(t) => t,
        // An incomplete multi-byte UTF-8 sequence at the tail is itself
        // ambiguous; withhold it rather than risk splitting a code point.
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            let (valid, rest) = buffer.split_at(valid_up_to);
            let text = std::str::from_utf8(valid).expect("valid_up_to guarantees validity");
            return trailing_whitespace_len_str(text) + rest.len();
        }
    };
    trailing_whitespace_len_str(text)
}

fn trailing_whitespace_len_str(text: &str) -> usize {
    text.chars()
        .rev()
        .take_while(|c| c.is_whitespace())
        .map(|c| c.len_utf8())
        .sum()
}

/// The outcome of scanning a channel-emitting state for one `step()`.
pub enum ScanResult {
    /// A full sentinel was found; `emit` is the (whitespace-trimmed) text
    /// before it, `sentinel_index` identifies which candidate matched, and
    /// `rest` is everything after the sentinel.
    SentinelFound {
        emit: String,
        sentinel_index: usize,
        rest: Vec<u8>,
    },
    /// No full sentinel yet; `emit` is safe to release now, `hold` is the
    /// ambiguous remainder that must stay in the buffer.
    Pending { emit: String, hold: Vec<u8> },
}

/// Applies the uniform transition rule for a channel-emitting state: look for
/// any of `sentinels` in `buffer`; if found, split there; otherwise withhold
/// the maximal ambiguous suffix (sentinel overlap extended through trailing
/// whitespace).
///
/// `buffer` is consumed and replaced by whatever remains unconsumed by the
/// caller (the `rest`/`hold` bytes), matching the "single growable buffer
/// reused across `add()` calls" design.
pub fn scan_channel(buffer: &[u8], sentinels: &[&[u8]]) -> ScanResult {
    let mut first_match: Option<(usize, usize)> = None; // (byte offset, sentinel index)
    for (i, sentinel) in sentinels.iter().enumerate() {
        if sentinel.is_empty() {
            continue;
        }
        if let Some(pos) = find_subslice(buffer, sentinel) {
            if first_match.is_none_or(|(best, _)| pos < best) {
                first_match = Some((pos, i));
            }
        }
    }

    if let Some((pos, idx)) = first_match {
        let sentinel = sentinels[idx];
        let before = &buffer[..pos];
        let trimmed = rtrim_whitespace(before);
        let rest = buffer[pos + sentinel.len()..].to_vec();
        return ScanResult::SentinelFound {
            emit: String::from_utf8_lossy(trimmed).into_owned(),
            sentinel_index: idx,
            rest,
        };
    }

    let k = max_overlap(buffer, sentinels);
    let preceding_ws = trailing_whitespace_len(&buffer[..buffer.len() - k]);
    let hold_len = (k + preceding_ws)
        .max(trailing_whitespace_len(buffer))
        .min(buffer.len());
    let split_at = buffer.len() - hold_len;
    let emit = String::from_utf8_lossy(&buffer[..split_at]).into_owned();
    let hold = buffer[split_at..].to_vec();
    ScanResult::Pending { emit, hold }
}

fn rtrim_whitespace(bytes: &[u8]) -> &[u8] {
    let trim = trailing_whitespace_len(bytes);
    &bytes[..bytes.len() - trim]
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Left-trims whitespace from a byte slice that immediately follows a
/// consumed sentinel (the "leading whitespace immediately after a sentinel
/// is elided" rule).
pub fn ltrim_whitespace(bytes: &[u8]) -> &[u8] {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start();
    &bytes[bytes.len() - trimmed.len()..]
}
