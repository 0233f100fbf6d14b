/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2022 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

use bitflags::bitflags;

use core::str;

bitflags! {
    /// All log flags
    ///
    /// Logging is controlled at runtime via the environment variable `LOG`, which contains the
    /// flags in the bitflags text syntax (e.g., `LOG=Info|Error|LibServ`). Any component can then
    /// use the `log` macro to log something.
    ///
    /// There are three general flags: `Info`, `Debug`, and `Error`. `Info` and `Error` are enabled
    /// by default. Additionally, there are per-component flags such as `KernEPs` or `LibGates`
    /// that control the logging of certain aspects within a specific component.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LogFlags : u128 {
        /// General: informational output (enabled by default)
        const Info          = 1 << 0;
        /// General: debugging output (disable by default)
        const Debug         = 1 << 1;
        /// General: error output (enabled by default)
        const Error         = 1 << 2;

        #[doc(hidden)]
        const __lib_start = 3;

        /// libraries: file system operations
        const LibFS         = 1 << (Self::__lib_start.bits() + 0);
        /// libraries: server operations
        const LibServ       = 1 << (Self::__lib_start.bits() + 1);
        /// libraries: requests to servers
        const LibServReqs   = 1 << (Self::__lib_start.bits() + 2);
        /// libraries: direct pipe
        const LibDirPipe    = 1 << (Self::__lib_start.bits() + 3);
        /// libraries: work loop
        const LibWorkLoop   = 1 << (Self::__lib_start.bits() + 4);
        /// libraries: gate activations and revocations
        const LibGates      = 1 << (Self::__lib_start.bits() + 5);
        /// libraries: system calls
        const LibSysc       = 1 << (Self::__lib_start.bits() + 6);

        #[doc(hidden)]
        const __tcu_start = Self::__lib_start.bits() + 7;

        /// TCU: sent, replied, and received messages (loopback only)
        const TCU           = 1 << (Self::__tcu_start.bits() + 0);
        /// TCU: dropped messages and failed commands (enabled by default)
        const TCUErr        = 1 << (Self::__tcu_start.bits() + 1);

        #[doc(hidden)]
        const __kern_start = Self::__tcu_start.bits() + 2;

        /// Kernel: endpoint configurations
        const KernEPs       = 1 << (Self::__kern_start.bits() + 0);
        /// Kernel: system calls
        const KernSysc      = 1 << (Self::__kern_start.bits() + 1);
        /// Kernel: capability operations
        const KernCaps      = 1 << (Self::__kern_start.bits() + 2);
        /// Kernel: memory allocations/frees
        const KernMem       = 1 << (Self::__kern_start.bits() + 3);
        /// Kernel: service calls
        const KernServ      = 1 << (Self::__kern_start.bits() + 4);
        /// Kernel: sendqueue operations
        const KernSQueue    = 1 << (Self::__kern_start.bits() + 5);
        /// Kernel: activities
        const KernActs      = 1 << (Self::__kern_start.bits() + 6);
        /// Kernel: sent upcalls
        const KernUpcalls   = 1 << (Self::__kern_start.bits() + 7);

        #[doc(hidden)]
        const __resmng_start = Self::__kern_start.bits() + 8;

        /// Resource manager: child operations
        const ResMngChild   = 1 << (Self::__resmng_start.bits() + 0);
        /// Resource manager: memory operations
        const ResMngMem     = 1 << (Self::__resmng_start.bits() + 1);
        /// Resource manager: tile operations
        const ResMngTiles   = 1 << (Self::__resmng_start.bits() + 2);
    }
}

impl Default for LogFlags {
    fn default() -> Self {
        LogFlags::Info | LogFlags::Error | LogFlags::TCUErr
    }
}

impl LogFlags {
    /// Returns the flags from the `LOG` variable in the environment or the default flags if the
    /// variable does not exist or cannot be parsed
    pub fn from_env() -> Self {
        #[cfg(feature = "loopback")]
        if let Ok(s) = std::env::var("LOG") {
            if let Ok(flags) = s.parse() {
                return flags;
            }
        }
        Self::default()
    }
}

impl str::FromStr for LogFlags {
    type Err = bitflags::parser::ParseError;

    fn from_str(flags: &str) -> Result<Self, Self::Err> {
        bitflags::parser::from_str(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let flags: LogFlags = "Info|LibServ|KernSysc".parse().unwrap();
        assert!(flags.contains(LogFlags::Info));
        assert!(flags.contains(LogFlags::LibServ));
        assert!(flags.contains(LogFlags::KernSysc));
        assert!(!flags.contains(LogFlags::Error));

        assert!("Info|NoSuchFlag".parse::<LogFlags>().is_err());
        assert_eq!("".parse::<LogFlags>().unwrap(), LogFlags::empty());
    }

    #[test]
    fn defaults() {
        let def = LogFlags::default();
        assert!(def.contains(LogFlags::Info | LogFlags::Error | LogFlags::TCUErr));
        assert!(!def.contains(LogFlags::TCU));
    }
}
