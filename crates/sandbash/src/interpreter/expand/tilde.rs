//! Tilde expansion

use crate::interpreter::ShellState;

/// Expand a tilde prefix: `~` is `$HOME`, `~+` is `$PWD`, `~-` is
/// `$OLDPWD`, and `~user` maps under `/home`. An unexpandable prefix comes
/// back as written.
pub fn expand_tilde(state: &ShellState, user: &str) -> String {
    match user {
        "" => state
            .get("HOME")
            .map(|v| v.to_field())
            .unwrap_or_else(|| state.cwd.display().to_string()),
        "+" => state.cwd.display().to_string(),
        "-" => match &state.prev_dir {
            Some(dir) => dir.display().to_string(),
            None => "~-".to_string(),
        },
        name => format!("/home/{name}"),
    }
}

/// Tilde expansion inside assignment values: the value start and every
/// position after an unquoted `:` get a tilde check (PATH-style values).
pub fn expand_tilde_in_assignment(state: &ShellState, value: &str) -> String {
    value
        .split(':')
        .map(|segment| match segment.strip_prefix('~') {
            Some(rest) => {
                let (user, path) = match rest.find('/') {
                    Some(i) => (&rest[..i], &rest[i..]),
                    None => (rest, ""),
                };
                format!("{}{}", expand_tilde(state, user), path)
            }
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::state::AssignMode;

    fn state() -> ShellState {
        let mut state = ShellState::new();
        state
            .set_scalar("HOME", "/home/tester".into(), AssignMode::default())
            .unwrap_or_default();
        state
    }

    #[test]
    fn bare_tilde_is_home() {
        assert_eq!(expand_tilde(&state(), ""), "/home/tester");
    }

    #[test]
    fn tilde_plus_is_cwd() {
        let mut s = state();
        s.cwd = "/work".into();
        assert_eq!(expand_tilde(&s, "+"), "/work");
    }

    #[test]
    fn tilde_minus_without_oldpwd_stays_literal() {
        assert_eq!(expand_tilde(&state(), "-"), "~-");
        let mut s = state();
        s.prev_dir = Some("/before".into());
        assert_eq!(expand_tilde(&s, "-"), "/before");
    }

    #[test]
    fn named_user() {
        assert_eq!(expand_tilde(&state(), "alice"), "/home/alice");
    }

    #[test]
    fn assignment_colon_positions() {
        let s = state();
        assert_eq!(
            expand_tilde_in_assignment(&s, "~/bin:/usr/bin:~alice/bin"),
            "/home/tester/bin:/usr/bin:/home/alice/bin"
        );
        assert_eq!(expand_tilde_in_assignment(&s, "a~b:c"), "a~b:c");
    }
}
