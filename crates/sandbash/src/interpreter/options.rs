//! Shell option flags (`set -o`, `shopt`)

/// Options toggled through `set` (single letters and `-o` names).
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// set -e: exit on a command failing in a non-forgiven position
    pub errexit: bool,
    /// set -u: reading an unset variable is fatal
    pub nounset: bool,
    /// set -o pipefail: pipeline status is the rightmost failure
    pub pipefail: bool,
    /// set -x: trace expanded commands to stderr
    pub xtrace: bool,
    /// set -f: disable pathname expansion
    pub noglob: bool,
    /// set -C: refuse to truncate existing files with `>`
    pub noclobber: bool,
    /// set -a: export every assigned variable
    pub allexport: bool,
    /// set -o posix: stricter POSIX behavior
    pub posix: bool,
    /// set +B: disable brace expansion (on by default)
    pub nobraceexpand: bool,
}

/// Options toggled through `shopt`.
#[derive(Debug, Clone)]
pub struct ShoptOptions {
    /// extended glob operators `?( ) *( ) +( ) @( ) !( )`
    pub extglob: bool,
    /// include dotfiles in glob results
    pub dotglob: bool,
    /// non-matching globs expand to nothing
    pub nullglob: bool,
    /// non-matching globs fail the command
    pub failglob: bool,
    /// `**` crosses directory levels
    pub globstar: bool,
    /// skip `.` and `..` in glob results
    pub globskipdots: bool,
    /// case-insensitive globbing
    pub nocaseglob: bool,
    /// case-insensitive `case` and `[[ ]]` pattern matching
    pub nocasematch: bool,
    /// alias expansion during parsing
    pub expand_aliases: bool,
    /// last pipeline stage runs in the current shell
    pub lastpipe: bool,
}

impl Default for ShoptOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            dotglob: false,
            nullglob: false,
            failglob: false,
            globstar: false,
            globskipdots: true,
            nocaseglob: false,
            nocasematch: false,
            expand_aliases: false,
            lastpipe: false,
        }
    }
}

/// Combined option state carried in the interpreter.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    pub set: SetOptions,
    pub shopt: ShoptOptions,
}

impl ShellOptions {
    /// Apply `set -X` / `set +X` single-letter options. Returns false for
    /// letters this shell does not know.
    pub fn apply_set_flag(&mut self, letter: char, enable: bool) -> bool {
        match letter {
            'e' => self.set.errexit = enable,
            'u' => self.set.nounset = enable,
            'x' => self.set.xtrace = enable,
            'f' => self.set.noglob = enable,
            'C' => self.set.noclobber = enable,
            'a' => self.set.allexport = enable,
            'B' => self.set.nobraceexpand = !enable,
            _ => return false,
        }
        true
    }

    /// Apply `set -o NAME` / `set +o NAME`.
    pub fn apply_set_option(&mut self, name: &str, enable: bool) -> bool {
        match name {
            "errexit" => self.set.errexit = enable,
            "nounset" => self.set.nounset = enable,
            "pipefail" => self.set.pipefail = enable,
            "xtrace" => self.set.xtrace = enable,
            "noglob" => self.set.noglob = enable,
            "noclobber" => self.set.noclobber = enable,
            "allexport" => self.set.allexport = enable,
            "posix" => self.set.posix = enable,
            "braceexpand" => self.set.nobraceexpand = !enable,
            _ => return false,
        }
        true
    }

    /// Apply `shopt -s NAME` / `shopt -u NAME`.
    pub fn apply_shopt(&mut self, name: &str, enable: bool) -> bool {
        match name {
            "extglob" => self.shopt.extglob = enable,
            "dotglob" => self.shopt.dotglob = enable,
            "nullglob" => self.shopt.nullglob = enable,
            "failglob" => self.shopt.failglob = enable,
            "globstar" => self.shopt.globstar = enable,
            "globskipdots" => self.shopt.globskipdots = enable,
            "nocaseglob" => self.shopt.nocaseglob = enable,
            "nocasematch" => self.shopt.nocasematch = enable,
            "expand_aliases" => self.shopt.expand_aliases = enable,
            "lastpipe" => self.shopt.lastpipe = enable,
            _ => return false,
        }
        true
    }

    /// Read a `shopt` flag by name.
    pub fn shopt_value(&self, name: &str) -> Option<bool> {
        Some(match name {
            "extglob" => self.shopt.extglob,
            "dotglob" => self.shopt.dotglob,
            "nullglob" => self.shopt.nullglob,
            "failglob" => self.shopt.failglob,
            "globstar" => self.shopt.globstar,
            "globskipdots" => self.shopt.globskipdots,
            "nocaseglob" => self.shopt.nocaseglob,
            "nocasematch" => self.shopt.nocasematch,
            "expand_aliases" => self.shopt.expand_aliases,
            "lastpipe" => self.shopt.lastpipe,
            _ => return None,
        })
    }

    /// Names and states for `set -o` output, in display order.
    pub fn set_o_listing(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("allexport", self.set.allexport),
            ("braceexpand", !self.set.nobraceexpand),
            ("errexit", self.set.errexit),
            ("noclobber", self.set.noclobber),
            ("noglob", self.set.noglob),
            ("nounset", self.set.nounset),
            ("pipefail", self.set.pipefail),
            ("posix", self.set.posix),
            ("xtrace", self.set.xtrace),
        ]
    }

    /// Names and states for `shopt` output, in display order.
    pub fn shopt_listing(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("dotglob", self.shopt.dotglob),
            ("expand_aliases", self.shopt.expand_aliases),
            ("extglob", self.shopt.extglob),
            ("failglob", self.shopt.failglob),
            ("globskipdots", self.shopt.globskipdots),
            ("globstar", self.shopt.globstar),
            ("lastpipe", self.shopt.lastpipe),
            ("nocaseglob", self.shopt.nocaseglob),
            ("nocasematch", self.shopt.nocasematch),
            ("nullglob", self.shopt.nullglob),
        ]
    }

    /// The letters shown by `$-`.
    pub fn flag_letters(&self) -> String {
        let mut letters = String::new();
        if self.set.allexport {
            letters.push('a');
        }
        if !self.set.nobraceexpand {
            letters.push('B');
        }
        if self.set.noclobber {
            letters.push('C');
        }
        if self.set.errexit {
            letters.push('e');
        }
        if self.set.noglob {
            letters.push('f');
        }
        // Scripts always read commands from a buffer here, never a terminal.
        letters.push('h');
        if self.set.nounset {
            letters.push('u');
        }
        if self.set.xtrace {
            letters.push('x');
        }
        letters
    }
}
