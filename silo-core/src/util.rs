/// Writes `values` into `out` through `f`, inserting `separator` between the
/// items that actually produced output.
pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Consumes characters from the front of `input` while `predicate` holds and
/// returns the consumed prefix.
pub fn consume_while<'s>(input: &mut &'s str, mut predicate: impl FnMut(&char) -> bool) -> &'s str {
    // Byte offset, not char count; the two differ outside ASCII.
    let len = input
        .char_indices()
        .find(|(_, c)| !predicate(c))
        .map_or(input.len(), |(i, _)| i);
    let (result, rest) = input.split_at(len);
    *input = rest;
    result
}

/// Largest index of `s` no greater than `max` that falls on a character
/// boundary.
pub fn floor_boundary(s: &str, max: usize) -> usize {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Formats a query for logging, trimming anything beyond ~500 characters.
#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            &$query[..$crate::floor_boundary(&$query, 497)].trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}
