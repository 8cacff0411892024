//! Ordering for mod release versions such as `2:1.4.0-beta3`.
//!
//! A version is an optional integer epoch followed by `:` and a body. Bodies
//! are compared as alternating runs of non-digits (compared as strings) and
//! digits (compared as numbers), starting with a non-digit run that is
//! usually empty.

use std::cmp::Ordering;

/// Compare two release version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (epoch_a, body_a) = split_epoch(a);
    let (epoch_b, body_b) = split_epoch(b);
    epoch_a
        .cmp(&epoch_b)
        .then_with(|| compare_body(body_a, body_b))
}

/// Pick the highest of `versions`, if any.
pub fn highest<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions.into_iter().max_by(|a, b| compare(a, b))
}

fn split_epoch(version: &str) -> (u64, &str) {
    if let Some((epoch, body)) = version.split_once(':')
        && let Ok(epoch) = epoch.parse::<u64>()
    {
        return (epoch, body);
    }
    (0, version)
}

fn compare_body(mut a: &str, mut b: &str) -> Ordering {
    loop {
        let (text_a, rest_a) = take_while(a, |c| !c.is_ascii_digit());
        let (text_b, rest_b) = take_while(b, |c| !c.is_ascii_digit());
        match text_a.cmp(text_b) {
            Ordering::Equal => {}
            // "1.0" sorts after "1" and "1-beta" before "1.0": a separator wins
            // over running out, running out wins over anything else.
            ord => return separator_aware(text_a, text_b, ord),
        }

        let (num_a, rest_a) = take_while(rest_a, |c| c.is_ascii_digit());
        let (num_b, rest_b) = take_while(rest_b, |c| c.is_ascii_digit());
        match compare_numeric(num_a, num_b) {
            Ordering::Equal => {}
            ord => return ord,
        }

        if rest_a.is_empty() && rest_b.is_empty() {
            return Ordering::Equal;
        }
        a = rest_a;
        b = rest_b;
    }
}

fn separator_aware(a: &str, b: &str, fallback: Ordering) -> Ordering {
    match (a.starts_with('.'), b.starts_with('.')) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => fallback,
    }
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn take_while(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    s.split_at(end)
}
