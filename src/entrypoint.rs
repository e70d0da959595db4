// Mon Feb 09 2026 - Alex

//! Entry point detection for PE and ELF images.

use goblin::elf::header::{ET_DYN, ET_EXEC};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use goblin::pe::section_table::SectionTable;
use goblin::pe::PE;
use goblin::Object;

const PE_MAGIC: &[u8] = b"MZ";
const ELF_MAGIC: &[u8] = b"\x7fELF";

fn parse(data: &[u8]) -> Option<Object<'_>> {
    if !data.starts_with(PE_MAGIC) && !data.starts_with(ELF_MAGIC) {
        return None;
    }
    match Object::parse(data) {
        Ok(object) => Some(object),
        Err(e) => {
            log::trace!("not an executable image: {}", e);
            None
        }
    }
}

pub fn pe_rva_to_offset(sections: &[SectionTable], rva: u64) -> Option<u64> {
    sections.iter().find_map(|section| {
        let start = section.virtual_address as u64;
        let size = section.virtual_size.max(section.size_of_raw_data) as u64;
        (rva >= start && rva < start + size).then(|| rva - start + section.pointer_to_raw_data as u64)
    })
}

fn pe_entry_offset(pe: &PE<'_>) -> Option<u64> {
    let rva = pe.entry as u64;
    pe_rva_to_offset(&pe.sections, rva).or_else(|| {
        // Entry points inside the headers map one to one.
        let headers = pe.header.optional_header.as_ref()?.windows_fields.size_of_headers as u64;
        (rva < headers).then_some(rva)
    })
}

fn elf_entry_offset(elf: &Elf<'_>) -> Option<u64> {
    elf.program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD)
        .find(|ph| elf.entry >= ph.p_vaddr && elf.entry < ph.p_vaddr + ph.p_filesz)
        .map(|ph| elf.entry - ph.p_vaddr + ph.p_offset)
}

/// File offset of the entry point of the image in `data`.
pub fn entry_point_offset(data: &[u8]) -> Option<u64> {
    match parse(data)? {
        Object::PE(pe) => pe_entry_offset(&pe),
        Object::Elf(elf) => elf_entry_offset(&elf),
        _ => None,
    }
}

/// Virtual address of the entry point of an image loaded at `base`.
pub fn entry_point_address(data: &[u8], base: u64) -> Option<u64> {
    match parse(data)? {
        Object::PE(pe) => Some(base + pe.entry as u64),
        Object::Elf(elf) => match elf.header.e_type {
            ET_EXEC => Some(elf.entry),
            ET_DYN => Some(base + elf.entry),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elf64(e_type: u16, entry: u64, vaddr: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(0x200);
        data.extend_from_slice(b"\x7fELF");
        data.extend_from_slice(&[2, 1, 1, 0]);
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&e_type.to_le_bytes());
        data.extend_from_slice(&0x3eu16.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&entry.to_le_bytes());
        data.extend_from_slice(&64u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        for field in [64u16, 56, 1, 64, 0, 0] {
            data.extend_from_slice(&field.to_le_bytes());
        }

        data.extend_from_slice(&PT_LOAD.to_le_bytes());
        data.extend_from_slice(&5u32.to_le_bytes());
        for field in [0u64, vaddr, vaddr, 0x200, 0x200, 0x1000] {
            data.extend_from_slice(&field.to_le_bytes());
        }
        data.resize(0x200, 0);
        data
    }

    #[test]
    fn test_elf_entry_offset() {
        let data = elf64(ET_EXEC, 0x400100, 0x400000);
        assert_eq!(entry_point_offset(&data), Some(0x100));
        assert_eq!(entry_point_address(&data, 0x400000), Some(0x400100));
    }

    #[test]
    fn test_shared_object_address_is_relative() {
        let data = elf64(ET_DYN, 0x140, 0);
        assert_eq!(entry_point_offset(&data), Some(0x140));
        assert_eq!(entry_point_address(&data, 0x7f00_0000), Some(0x7f00_0140));
    }

    #[test]
    fn test_not_an_image() {
        assert_eq!(entry_point_offset(b"plain text"), None);
        assert_eq!(entry_point_offset(b"MZ but truncated"), None);
        assert_eq!(entry_point_address(b"", 0x1000), None);
    }

    #[test]
    fn test_pe_rva_to_offset() {
        let sections = [
            SectionTable {
                virtual_address: 0x1000,
                virtual_size: 0x800,
                size_of_raw_data: 0x600,
                pointer_to_raw_data: 0x400,
                ..SectionTable::default()
            },
            SectionTable {
                virtual_address: 0x2000,
                virtual_size: 0x100,
                size_of_raw_data: 0x200,
                pointer_to_raw_data: 0xa00,
                ..SectionTable::default()
            },
        ];
        assert_eq!(pe_rva_to_offset(&sections, 0x1010), Some(0x410));
        assert_eq!(pe_rva_to_offset(&sections, 0x2150), Some(0xb50));
        assert_eq!(pe_rva_to_offset(&sections, 0x3000), None);
    }
}
