use bitflags::bitflags;

bitflags! {
    /// Behavior tweaks applied per application.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
    pub struct OptionFlags: u32 {
        /// Honor the do-not-wait map flag.
        ///
        /// This can offer substantial speedups, but some titles make
        /// incorrect assumptions about when a map operation succeeds
        /// when that flag is set, so it is off unless an app profile
        /// turns it on.
        const ALLOW_MAP_FLAG_NO_WAIT = 1 << 0;
    }
}

/// Per-application configuration resolved at device creation.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub flags: OptionFlags,
}

impl Options {
    /// Looks up the option profile for an executable name. Unknown
    /// executables get the defaults.
    pub fn for_executable(exe_name: &str) -> Options {
        const APP_PROFILES: &[(&str, OptionFlags)] =
            &[("Dishonored2.exe", OptionFlags::ALLOW_MAP_FLAG_NO_WAIT)];

        let flags = APP_PROFILES
            .iter()
            .find(|(name, _)| *name == exe_name)
            .map(|(_, flags)| *flags)
            .unwrap_or_default();

        Options { flags }
    }

    pub fn test(&self, flag: OptionFlags) -> bool {
        self.flags.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_lookup_falls_back_to_defaults() {
        let profiled = Options::for_executable("Dishonored2.exe");
        assert!(profiled.test(OptionFlags::ALLOW_MAP_FLAG_NO_WAIT));

        let generic = Options::for_executable("Game.exe");
        assert_eq!(generic, Options::default());
    }
}
