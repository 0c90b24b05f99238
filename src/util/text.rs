use std::borrow::Cow;
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Characters left dangling around an item name once the entry title is removed.
const NAME_TRIM_CHARS: &[char] = &[' ', '-', '_', ',', ':'];

/// Characters that cannot appear in a directory name on common filesystems.
const RESERVED_PATH_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Removes a redundant parent-title prefix or suffix from an item name.
///
/// Backends often list chapters as `"<Series Title> - Chapter 12"`. The title
/// is stripped from either end and the separators left behind are trimmed.
/// Names that would become empty are returned unchanged.
///
/// # Examples
///
/// ```
/// use shelfsync::util::sanitize_item_name;
///
/// assert_eq!(sanitize_item_name("One Piece - Chapter 1", "One Piece"), "Chapter 1");
/// assert_eq!(sanitize_item_name("Episode 3 | Show", "Other"), "Episode 3 | Show");
/// ```
pub fn sanitize_item_name<'a>(name: &'a str, parent_title: &str) -> Cow<'a, str> {
    let trimmed = name.trim();
    let title = parent_title.trim();
    if title.is_empty() {
        return Cow::Borrowed(trimmed);
    }

    let stripped = trimmed
        .strip_prefix(title)
        .or_else(|| trimmed.strip_suffix(title))
        .map(|rest| rest.trim_matches(NAME_TRIM_CHARS));

    match stripped {
        Some(rest) if !rest.is_empty() => Cow::Owned(rest.to_string()),
        _ => Cow::Borrowed(trimmed),
    }
}

/// Replaces characters that are invalid in directory names with `_`.
///
/// Returns `Cow::Borrowed` when the input is already safe.
pub fn sanitize_file_name(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();
    if !trimmed
        .chars()
        .any(|c| RESERVED_PATH_CHARS.contains(&c) || c.is_control())
    {
        return Cow::Borrowed(trimmed);
    }

    Cow::Owned(
        trimmed
            .chars()
            .map(|c| {
                if RESERVED_PATH_CHARS.contains(&c) || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect(),
    )
}

/// Compares names so that embedded numbers order by value.
///
/// Letters compare case-insensitively. Names that only differ in leading
/// zeros fall back to a plain comparison.
///
/// ```
/// use shelfsync::util::natural_cmp;
/// use std::cmp::Ordering;
///
/// assert_eq!(natural_cmp("Chapter 9", "Chapter 10"), Ordering::Less);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        let (l, r) = match (left.peek(), right.peek()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&l), Some(&r)) => (l, r),
        };

        let ord = if l.is_ascii_digit() && r.is_ascii_digit() {
            let ln = take_digits(&mut left);
            let rn = take_digits(&mut right);
            let (ln, rn) = (ln.trim_start_matches('0'), rn.trim_start_matches('0'));
            ln.len().cmp(&rn.len()).then_with(|| ln.cmp(rn))
        } else {
            left.next();
            right.next();
            l.to_lowercase().cmp(r.to_lowercase())
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}
