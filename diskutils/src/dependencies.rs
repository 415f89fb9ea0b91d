use std::process::Command;

/// External binaries this crate shells out to. Centralising the list here
/// keeps every call site's `Command::new(...)` consistent and gives a
/// single place to swap in a resolved absolute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Sfdisk,
    Partx,
    Mkfs,
    Mount,
    Umount,
    Udevadm,
    Cryptsetup,
    Wipefs,
    Blkid,
    Lsblk,
    Mkdir,
    Touch,
}

impl Dependency {
    pub fn name(&self) -> &'static str {
        match self {
            Dependency::Sfdisk => "sfdisk",
            Dependency::Partx => "partx",
            Dependency::Mkfs => "mkfs",
            Dependency::Mount => "mount",
            Dependency::Umount => "umount",
            Dependency::Udevadm => "udevadm",
            Dependency::Cryptsetup => "cryptsetup",
            Dependency::Wipefs => "wipefs",
            Dependency::Blkid => "blkid",
            Dependency::Lsblk => "lsblk",
            Dependency::Mkdir => "mkdir",
            Dependency::Touch => "touch",
        }
    }

    /// Resolve this dependency's binary via `PATH` (falling back to its bare
    /// name so the resulting `Command` still produces a meaningful "not
    /// found" error) and return a fresh `Command` for it.
    pub fn cmd(&self) -> Command {
        let resolved = which::which(self.name())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| self.name().to_string());
        Command::new(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_uses_dependency_name_as_fallback() {
        // wipefs is virtually always installed in CI containers that carry
        // util-linux; this is mostly a smoke test that cmd() doesn't panic.
        let cmd = Dependency::Wipefs.cmd();
        assert!(cmd.get_program().to_string_lossy().contains("wipefs"));
    }
}
