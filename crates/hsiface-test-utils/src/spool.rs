use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// One ring-buffer slice: `HitSpool-<n>.dat` plus its tick range.
#[derive(Debug, Clone, Copy)]
pub struct SliceSpec {
    pub n: u32,
    pub start_tick: i64,
    pub stop_tick: i64,
}

/// A temporary on-disk spool directory: `HitSpool-<n>.dat` files plus the
/// `HsInfo.txt` sidecar metadata the Worker's spool resolver reads.
pub struct SpoolFixture {
    dir: TempDir,
}

impl SpoolFixture {
    /// Build a spool directory from `slices`, writing `write_head` as the
    /// current ring-buffer position.
    pub fn build(slices: &[SliceSpec], write_head: u32) -> Self {
        let dir = TempDir::new().expect("create temp spool dir");
        for slice in slices {
            let path = dir.path().join(format!("HitSpool-{}.dat", slice.n));
            fs::write(&path, format!("slice {} payload\n", slice.n)).expect("write slice file");
        }
        let info = render_info_txt(slices, write_head);
        fs::write(dir.path().join("HsInfo.txt"), info).expect("write HsInfo.txt");
        SpoolFixture { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

fn render_info_txt(slices: &[SliceSpec], write_head: u32) -> String {
    let mut body = String::new();
    body.push_str(&format!("write_head={write_head}\n"));
    for slice in slices {
        body.push_str(&format!(
            "{} {} {}\n",
            slice.n, slice.start_tick, slice.stop_tick
        ));
    }
    body
}
