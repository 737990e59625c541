//! Built-in chain families.
//!
//! Each submodule defines a [`ChainFamily`](crate::family::ChainFamily)
//! marker, its provider and network enums, address rules and a
//! `capabilities()` constructor.

pub mod evm;
pub mod flow;
pub mod solana;

/// Match user input against canonical names, ignoring case and `-`/`_`/space
/// separators.
pub(crate) fn parse_name<T: Copy>(
    input: &str,
    all: &[T],
    name: fn(T) -> &'static str,
) -> Option<T> {
    let wanted = normalize(input);
    all.iter().copied().find(|item| normalize(name(*item)) == wanted)
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}
