// SPDX-License-Identifier: GPL-3.0-only

use std::fs;

use sdm_types::LocalPath;

use crate::error::{Result, SysError};

/// One line of `/proc/self/mountinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_point: LocalPath,
    pub fs_type: String,
    pub source: String,
}

pub fn read_mount_info() -> Result<Vec<MountEntry>> {
    let mount_info = fs::read_to_string("/proc/self/mountinfo")?;
    parse_mount_info(&mount_info)
}

pub fn parse_mount_info(input: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let (left, right) = line
            .split_once(" - ")
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;

        let mount_point = left
            .split_whitespace()
            .nth(4)
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields
            .next()
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;
        let source = right_fields.next().unwrap_or_default();

        entries.push(MountEntry {
            mount_point: LocalPath::new(unescape_mount_field(mount_point)),
            fs_type: fs_type.to_string(),
            source: unescape_mount_field(source),
        });
    }

    Ok(entries)
}

/// Removable volumes mounted directly below `<storage_root>/storage`
///
/// Skips the emulated primary storage and the `self` alias.
pub fn secondary_volumes(entries: &[MountEntry], storage_root: &LocalPath) -> Vec<LocalPath> {
    let storage = storage_root.child("storage");
    let mut volumes: Vec<LocalPath> = entries
        .iter()
        .map(|entry| &entry.mount_point)
        .filter(|mount| mount.parent().as_ref() == Some(&storage))
        .filter(|mount| !matches!(mount.name(), "emulated" | "self"))
        .cloned()
        .collect();
    volumes.sort();
    volumes.dedup();
    volumes
}

/// Undo the kernel's `\ooo` octal escapes; the result may be multi-byte UTF-8
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\' && index + 4 <= bytes.len() {
            let escaped = std::str::from_utf8(&bytes[index + 1..index + 4])
                .ok()
                .filter(|octal| octal.bytes().all(|b| (b'0'..=b'7').contains(&b)))
                .and_then(|octal| u8::from_str_radix(octal, 8).ok());
            if let Some(byte) = escaped {
                output.push(byte);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
1 0 253:0 / / ro,relatime - ext4 /dev/block/dm-0 ro
30 1 0:20 / /storage rw - tmpfs tmpfs rw
31 30 0:40 / /storage/emulated rw - fuse /dev/fuse rw
32 30 0:41 / /storage/self rw - tmpfs tmpfs rw
33 30 0:42 / /storage/1A2B-3C4D rw - sdfat /dev/block/vold/public:179,1 rw
34 33 0:43 / /storage/1A2B-3C4D/Android\\040obb rw - sdfat /dev/block/x rw
";

    #[test]
    fn parses_mount_points_and_types() {
        let entries = parse_mount_info(SAMPLE).expect("parse should succeed");
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].mount_point, LocalPath::root());
        assert_eq!(entries[4].fs_type, "sdfat");
        assert_eq!(entries[5].mount_point.name(), "Android obb");
    }

    #[test]
    fn secondary_volumes_skip_emulated_and_self() {
        let entries = parse_mount_info(SAMPLE).expect("parse should succeed");
        let volumes = secondary_volumes(&entries, &LocalPath::root());
        assert_eq!(volumes, vec![LocalPath::new("/storage/1A2B-3C4D")]);
    }

    #[test]
    fn octal_escapes_are_decoded_anywhere() {
        assert_eq!(unescape_mount_field(r"/storage/My\040Card"), "/storage/My Card");
        assert_eq!(unescape_mount_field(r"/storage/X\040"), "/storage/X ");
        assert_eq!(unescape_mount_field(r"/storage/X\04"), r"/storage/X\04");
        assert_eq!(unescape_mount_field(r"/storage/X\999"), r"/storage/X\999");
    }

    #[test]
    fn non_ascii_names_survive() {
        assert_eq!(unescape_mount_field("/storage/Übung"), "/storage/Übung");
        // Escaped UTF-8 bytes of "é"
        assert_eq!(unescape_mount_field(r"/storage/caf\303\251"), "/storage/café");
    }

    #[test]
    fn rejects_lines_without_separator() {
        assert!(matches!(
            parse_mount_info("1 0 253:0 / / ro"),
            Err(SysError::InvalidMountInfoLine(_))
        ));
    }
}
