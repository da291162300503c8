//! Advertised name grammar.
//!
//! Accepted: `<prefix><digits>` or `<prefix><digits>/<digits>`, where
//! `<digits>` is one or more ASCII decimal digits. Anything else is
//! rejected, including a trailing `/` and letters after the digit run.

use crate::config::DEVICE_NAME_PREFIX;

/// Check a raw advertised name against [`DEVICE_NAME_PREFIX`].
pub fn name_matches(name: &[u8]) -> bool {
    name_matches_prefix(DEVICE_NAME_PREFIX.as_bytes(), name)
}

/// Check a raw advertised name against an arbitrary prefix.
pub fn name_matches_prefix(prefix: &[u8], name: &[u8]) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };

    let (node, suffix) = split_digits(rest);
    if node == 0 {
        return false;
    }

    match suffix.split_first() {
        None => true,
        Some((&b'/', tail)) => {
            let (index, trailing) = split_digits(tail);
            index > 0 && trailing.is_empty()
        }
        Some(_) => false,
    }
}

/// Length of the leading digit run and whatever follows it.
fn split_digits(bytes: &[u8]) -> (usize, &[u8]) {
    let n = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    (n, &bytes[n..])
}
