use nix::unistd::{sysconf, SysconfVar};
use std::fs::File;
use std::io::Read;
use std::path::Path;

lazy_static! {
    static ref SYSTEM_PAGE_SIZE: usize = page_size_init();
}

fn page_size_init() -> usize {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(sz)) => sz as usize,
        _ => 4096,
    }
}

pub fn page_size() -> usize {
    *SYSTEM_PAGE_SIZE
}

pub fn floor_page_size(sz: usize) -> usize {
    sz & !(page_size() - 1)
}

pub fn ceil_page_size(sz: usize) -> usize {
    (sz + page_size() - 1) & !(page_size() - 1)
}

/// ELF class (ELFCLASS32/ELFCLASS64) of the file at `path`, or None if it
/// isn't an ELF file or can't be read. Used to refuse exec of binaries the
/// recorder can't trace.
pub fn read_elf_class<P: AsRef<Path>>(path: P) -> Option<u8> {
    use goblin::elf::header::{EI_CLASS, ELFMAG, SELFMAG, SIZEOF_IDENT};

    let mut f = File::open(path).ok()?;
    let mut ident = [0u8; SIZEOF_IDENT];
    f.read_exact(&mut ident).ok()?;
    if ident[..SELFMAG] != ELFMAG[..] {
        return None;
    }
    Some(ident[EI_CLASS])
}

/// Files the recorder refuses to let tracees open: device nodes whose
/// side effects (GPU command submission, shared audio state) can't be
/// recorded faithfully.
pub fn is_blacklisted_filename(file_name: &[u8]) -> bool {
    file_name.starts_with(b"/dev/dri/")
        || file_name.starts_with(b"/dev/nvidia")
        || file_name == b"/dev/nvidiactl"
        || file_name == b"/usr/share/alsa/alsa.conf"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rounding() {
        let ps = page_size();
        assert_eq!(0, floor_page_size(ps - 1));
        assert_eq!(ps, ceil_page_size(1));
        assert_eq!(ps, ceil_page_size(ps));
        assert_eq!(2 * ps, ceil_page_size(ps + 1));
    }

    #[test]
    fn blacklist() {
        assert!(is_blacklisted_filename(b"/dev/dri/card0"));
        assert!(is_blacklisted_filename(b"/dev/nvidia0"));
        assert!(!is_blacklisted_filename(b"/tmp/scratch"));
    }

    #[test]
    fn elf_class_of_non_elf() {
        assert_eq!(None, read_elf_class("/dev/null"));
    }
}
