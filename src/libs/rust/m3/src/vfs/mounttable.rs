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

use core::fmt;

use crate::col::{String, ToString, Vec};
use crate::errors::{Code, Error};
use crate::rc::Rc;
use crate::serialize::{M3Deserializer, M3Serializer, VecSink};
use crate::tiles::ChildActivity;
use crate::vfs::BootFS;

/// A mounted file system
#[derive(Debug)]
pub enum FileSystem {
    /// The file system of boot modules
    Boot(BootFS),
}

impl FileSystem {
    /// Returns the type tag that is used for serialization
    pub fn fs_type(&self) -> u8 {
        match self {
            Self::Boot(_) => BootFS::FS_TYPE,
        }
    }

    fn delegate(&self, _act: &ChildActivity) -> Result<(), Error> {
        match self {
            // boot modules are obtained from the resource manager on open
            Self::Boot(_) => Ok(()),
        }
    }

    fn serialize(&self, s: &mut M3Serializer<VecSink>) {
        match self {
            Self::Boot(fs) => fs.serialize(s),
        }
    }

    fn unserialize(ty: u8, s: &mut M3Deserializer<'_>) -> Result<Self, Error> {
        match ty {
            BootFS::FS_TYPE => BootFS::unserialize(s).map(Self::Boot),
            _ => Err(Error::new(Code::InvArgs)),
        }
    }
}

/// A reference to a file system
pub type FSHandle = Rc<FileSystem>;

/// The table of mount points
///
/// Paths are resolved to the mount point with the longest matching path, considering only
/// matches at component boundaries.
#[derive(Default)]
pub struct MountTable {
    mounts: Vec<(String, FSHandle)>,
}

fn normalize(path: &str) -> Result<String, Error> {
    if !path.starts_with('/') || path.contains("..") {
        return Err(Error::new(Code::InvArgs));
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    }
    else {
        trimmed.to_string()
    })
}

fn matches_mount(path: &str, mount: &str) -> bool {
    if mount == "/" {
        return true;
    }
    match path.strip_prefix(mount) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn comps(path: &str) -> usize {
    path.split('/').filter(|c| !c.is_empty()).count()
}

impl MountTable {
    /// Adds a new mount point at given path and given file system to the table
    pub fn add(&mut self, path: &str, fs: FSHandle) -> Result<(), Error> {
        let path = normalize(path)?;
        if self.mounts.iter().any(|(p, _)| *p == path) {
            return Err(Error::new(Code::Exists));
        }

        // keep deeper mount points in front so that the first match is the longest one
        let cnt = comps(&path);
        let pos = self
            .mounts
            .iter()
            .position(|(p, _)| cnt > comps(p))
            .unwrap_or(self.mounts.len());
        self.mounts.insert(pos, (path, fs));
        Ok(())
    }

    /// Returns the file system mounted exactly at the given path
    pub fn get_by_path(&self, path: &str) -> Option<FSHandle> {
        let path = normalize(path).ok()?;
        self.mounts
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, fs)| fs.clone())
    }

    /// Resolves `path` to the file system and the path within that file system
    ///
    /// Fails with [`NoSuchFile`](Code::NoSuchFile) if no mount point matches.
    pub fn resolve<'p>(&self, path: &'p str) -> Result<(FSHandle, &'p str), Error> {
        if !path.starts_with('/') {
            return Err(Error::new(Code::InvArgs));
        }

        for (mpath, fs) in &self.mounts {
            if matches_mount(path, mpath) {
                let rest = if mpath == "/" {
                    path
                }
                else {
                    &path[mpath.len()..]
                };
                return Ok((fs.clone(), rest));
            }
        }
        Err(Error::new(Code::NoSuchFile))
    }

    /// Removes the mount point at `path` from the table
    pub fn remove(&mut self, path: &str) -> Result<(), Error> {
        let path = normalize(path)?;
        match self.mounts.iter().position(|(p, _)| *p == path) {
            Some(i) => {
                self.mounts.remove(i);
                Ok(())
            },
            None => Err(Error::new(Code::NoSuchFile)),
        }
    }

    pub(crate) fn delegate(&self, act: &ChildActivity) -> Result<(), Error> {
        for (_cpath, ppath) in act.mounts() {
            if let Some(fs) = self.get_by_path(ppath) {
                fs.delegate(act)?;
            }
        }
        Ok(())
    }

    /// Serializes the mounts in `map`, which maps the child's mount paths to ours
    pub(crate) fn serialize(&self, map: &[(String, String)], s: &mut M3Serializer<VecSink>) {
        let mounts = map
            .iter()
            .filter_map(|(cpath, ppath)| self.get_by_path(ppath).map(|fs| (cpath, fs)))
            .collect::<Vec<_>>();

        s.push(mounts.len());
        for (cpath, fs) in mounts {
            s.push(cpath.as_str());
            s.push(fs.fs_type());
            fs.serialize(s);
        }
    }

    pub(crate) fn unserialize(s: &mut M3Deserializer<'_>) -> Result<MountTable, Error> {
        let mut mt = MountTable::default();

        let count: usize = s.pop()?;
        for _ in 0..count {
            let path: String = s.pop()?;
            let ty: u8 = s.pop()?;
            mt.add(&path, Rc::new(FileSystem::unserialize(ty, s)?))?;
        }

        Ok(mt)
    }
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MountTable[")?;
        for (path, fs) in &self.mounts {
            writeln!(f, "  {} -> {:?}", path, fs)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootfs() -> FSHandle {
        Rc::new(FileSystem::Boot(BootFS::new()))
    }

    #[test]
    fn longest_prefix() {
        let mut mt = MountTable::default();
        mt.add("/", bootfs()).unwrap();
        mt.add("/mods/", bootfs()).unwrap();

        let (_, rest) = mt.resolve("/mods/test.txt").unwrap();
        assert_eq!(rest, "/test.txt");
        let (_, rest) = mt.resolve("/test.txt").unwrap();
        assert_eq!(rest, "/test.txt");
        // no match at a component boundary
        let (_, rest) = mt.resolve("/modsx/a").unwrap();
        assert_eq!(rest, "/modsx/a");
    }

    #[test]
    fn no_mount() {
        let mut mt = MountTable::default();
        mt.add("/mods", bootfs()).unwrap();
        assert_eq!(
            mt.resolve("/other").err().map(|e| e.code()),
            Some(Code::NoSuchFile)
        );
        assert_eq!(
            mt.add("/mods/", bootfs()).unwrap_err().code(),
            Code::Exists
        );
        mt.remove("/mods").unwrap();
        assert_eq!(mt.remove("/mods").unwrap_err().code(), Code::NoSuchFile);
    }

    #[test]
    fn transfer_mapped_paths() {
        let mut mt = MountTable::default();
        mt.add("/boot", bootfs()).unwrap();

        let mut s = M3Serializer::new(VecSink::new());
        mt.serialize(
            &[
                ("/".to_string(), "/boot".to_string()),
                ("/x".to_string(), "/missing".to_string()),
            ],
            &mut s,
        );
        let words = s.into_sink().into_vec();

        let child = MountTable::unserialize(&mut M3Deserializer::new(&words)).unwrap();
        assert!(child.get_by_path("/").is_some());
        assert!(child.get_by_path("/boot").is_none());
    }
}
