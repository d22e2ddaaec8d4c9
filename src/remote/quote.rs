// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Shell quoting.
//!
//! Commands are sent to hosts as shell strings so that tests can assert on the exact CLI that was
//! issued. Any fragment that comes from test input (volume names, paths, option values,
//! descriptions) must go through [`quote`] before it is interpolated into a command.

/// Characters that never need quoting in a POSIX shell word.
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)
}

/// Quote `word` so that a POSIX shell reads it back as exactly one word with the same contents.
pub fn quote(word: &str) -> String {
    if word.is_empty() {
        return "''".to_string();
    }
    if word.chars().all(is_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Quote each word and join them with spaces.
pub fn join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_words_are_unchanged() {
        assert_eq!(quote("testvol"), "testvol");
        assert_eq!(quote("server1:/bricks/testvol_brick0"), "server1:/bricks/testvol_brick0");
        assert_eq!(quote("cluster.server-quorum-type=server"), "cluster.server-quorum-type=server");
    }

    #[test]
    fn unsafe_words_are_quoted() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("$p3C!@l C#@R@cT#R$"), "'$p3C!@l C#@R@cT#R$'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("x; rm -rf /"), "'x; rm -rf /'");
    }

    #[test]
    fn quoted_words_round_trip_through_a_shell() {
        for word in ["plain", "two words", "it's", "$HOME", "`id`", "a\"b", "*", "new\nline"] {
            let out = std::process::Command::new("sh")
                .arg("-c")
                .arg(format!("printf %s {}", quote(word)))
                .output()
                .unwrap();
            assert_eq!(String::from_utf8(out.stdout).unwrap(), word);
        }
    }

    #[test]
    fn join_quotes_each_word() {
        assert_eq!(join(["gluster", "volume", "set", "v", "k", "a b"]), "gluster volume set v k 'a b'");
    }
}
