// 8.3 short name generation for local files and directories

use std::collections::HashSet;

fn is_valid_short_name_char(c: char) -> bool {
    matches!(c, 'A'..='Z' | '0'..='9' | '_' | '.' | '~' | '-')
}

/// Derive the 8.3 short name of a local file name.
///
/// Uppercases, replaces anything outside `[A-Z0-9_.~-]` with `_`, keeps only
/// the last `.` as the extension separator and truncates to 8 + 3 characters.
pub fn short_file_name(file_name: &str) -> String {
    let mut name: String = file_name
        .to_uppercase()
        .chars()
        .map(|c| if is_valid_short_name_char(c) { c } else { '_' })
        .collect();

    // A name cannot start with '.', so a leading only-dot is not an extension
    let dot = match name.rfind('.') {
        Some(0) => {
            name = name.replace('.', "_");
            None
        }
        Some(dot) => {
            name = format!("{}{}", name[..dot].replace('.', "_"), &name[dot..]);
            Some(dot)
        }
        None => None,
    };

    let (base, extension) = match dot {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name.as_str(), ""),
    };

    let base: String = base.chars().take(8).collect();
    let extension: String = extension.chars().take(3).collect();

    if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension)
    }
}

/// Overwrite the trailing characters of the base name with `~n`.
pub fn with_numeric_tail(short_name: &str, n: u32) -> String {
    let tail = format!("~{}", n);
    let (base, extension) = match short_name.rfind('.') {
        Some(dot) => (&short_name[..dot], Some(&short_name[dot + 1..])),
        None => (short_name, None),
    };

    let base = if base.len() > tail.len() {
        format!("{}{}", &base[..base.len() - tail.len()], tail)
    } else {
        let keep = base.len().min(8 - tail.len().min(8));
        format!("{}{}", &base[..keep], tail)
    };

    match extension {
        Some(extension) => format!("{}.{}", base, extension),
        None => base,
    }
}

/// Short names already handed out within one directory.
#[derive(Debug, Default)]
pub struct ShortNameSet {
    names: HashSet<String>,
}

impl ShortNameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a short name for `file_name` that does not collide
    /// (case-insensitively) with any name already in the set, and claim it.
    pub fn claim(&mut self, file_name: &str) -> String {
        let short_name = short_file_name(file_name);
        let mut candidate = short_name.clone();
        let mut duplicate_id = 1;

        while self.names.contains(&candidate.to_uppercase()) {
            candidate = with_numeric_tail(&short_name, duplicate_id);
            duplicate_id += 1;
        }

        self.names.insert(candidate.to_uppercase());
        candidate
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.names.contains(&short_name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_file_name() {
        assert_eq!(short_file_name("a.txt"), "A.TXT");
        assert_eq!(short_file_name("readme"), "README");
        assert_eq!(short_file_name("very_long_filename.jpeg"), "VERY_LON.JPE");
        assert_eq!(short_file_name("archive.tar.gz"), "ARCHIVE_.GZ");
        assert_eq!(short_file_name(".profile"), "_PROFILE");
        assert_eq!(short_file_name("réport.txt"), "R_PORT.TXT");
        assert_eq!(short_file_name("my file!.doc"), "MY_FILE_.DOC");
        assert_eq!(short_file_name("trailing."), "TRAILING");
    }

    #[test]
    fn test_numeric_tail_overwrites_base() {
        assert_eq!(with_numeric_tail("REPORT.TXT", 1), "REPO~1.TXT");
        assert_eq!(with_numeric_tail("LONGFILE.TXT", 2), "LONGFI~2.TXT");
        assert_eq!(with_numeric_tail("LONGFILE.TXT", 10), "LONGF~10.TXT");
        assert_eq!(with_numeric_tail("AB", 1), "AB~1");
        assert_eq!(with_numeric_tail("NOEXTENS", 3), "NOEXTE~3");
    }

    #[test]
    fn test_claim_disambiguates_collisions() {
        let mut names = ShortNameSet::new();
        assert_eq!(names.claim("réport.txt"), "R_PORT.TXT");
        assert_eq!(names.claim("r#port.txt"), "R_PO~1.TXT");
        assert_eq!(names.claim("r port.txt"), "R_PO~2.TXT");
        assert_eq!(names.claim("report!.txt"), "REPORT_.TXT");
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_claim_is_case_insensitive() {
        let mut names = ShortNameSet::new();
        let first = names.claim("Data.bin");
        let second = names.claim("DATA.BIN");
        assert_ne!(first, second);
        assert!(names.contains("data.bin"));
    }
}
