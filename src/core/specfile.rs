//! RPM spec file reader: preamble tags, simple macros and per-package sections.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::io;

/// Section names that open a new block.
const SECTIONS: [&str; 8] = [
    "description",
    "package",
    "prep",
    "build",
    "install",
    "clean",
    "files",
    "changelog",
];

/// Section name to package name to raw lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecSections {
    pub name: String,
    pub section: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl SpecSections {
    pub fn parse(content: &str) -> Self {
        let lines: Vec<&str> = content.lines().collect();
        let name = lines
            .iter()
            .find(|line| line.starts_with("Name:"))
            .and_then(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                (tokens.len() == 2).then(|| tokens[1].to_string())
            })
            .unwrap_or_else(|| "head".to_string());

        let mut sections: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        let mut current = ("package".to_string(), name.clone());
        sections
            .entry(current.0.clone())
            .or_default()
            .entry(current.1.clone())
            .or_default();

        for line in lines {
            if let Some(rest) = line.strip_prefix('%') {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                if let Some(first) = tokens.first().filter(|t| SECTIONS.contains(t)) {
                    let package = if tokens.len() == 3 && tokens[1] == "-n" {
                        tokens[2].to_string()
                    } else {
                        name.clone()
                    };
                    current = (first.to_string(), package);
                    sections
                        .entry(current.0.clone())
                        .or_default()
                        .entry(current.1.clone())
                        .or_default();
                    continue;
                }
            }
            sections
                .entry(current.0.clone())
                .or_default()
                .entry(current.1.clone())
                .or_default()
                .push(line.to_string());
        }

        Self {
            name,
            section: sections,
        }
    }

    /// Lines of `section` for the main package.
    pub fn main_section(&self, section: &str) -> &[String] {
        self.package_section(section, &self.name)
    }

    pub fn package_section(&self, section: &str, package: &str) -> &[String] {
        self.section
            .get(section)
            .and_then(|packages| packages.get(package))
            .map(|lines| lines.as_slice())
            .unwrap_or(&[])
    }
}

/// Preamble of a spec file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecFile {
    pub name: String,
    pub version: String,
    pub release: String,
    /// Source values in declaration order.
    pub sources: Vec<String>,
    /// `Source0` (or `Source`) to value.
    pub sources_dict: BTreeMap<String, String>,
    pub patches: Vec<String>,
    /// `%global` and `%define` macros.
    pub macros: BTreeMap<String, String>,
}

impl SpecFile {
    pub fn load(path: &Path) -> Result<(Self, SpecSections)> {
        let content = io::read_file(path, "read spec file")?;
        Ok((Self::parse(&content), SpecSections::parse(&content)))
    }

    pub fn parse(content: &str) -> Self {
        let mut spec = SpecFile::default();
        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed
                .strip_prefix("%global")
                .or_else(|| trimmed.strip_prefix("%define"))
            {
                let mut parts = rest.trim().splitn(2, char::is_whitespace);
                if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                    spec.macros.insert(key.to_string(), value.trim().to_string());
                }
                continue;
            }

            let Some((tag, value)) = trimmed.split_once(':') else {
                continue;
            };
            if tag.contains(char::is_whitespace) || tag.is_empty() {
                continue;
            }
            let value = value.trim().to_string();
            let lower = tag.to_lowercase();
            match lower.as_str() {
                "name" if spec.name.is_empty() => spec.name = value,
                "version" if spec.version.is_empty() => spec.version = value,
                "release" if spec.release.is_empty() => spec.release = value,
                _ if lower.starts_with("source") && is_numbered(&lower["source".len()..]) => {
                    spec.sources_dict.insert(tag.to_string(), value.clone());
                    spec.sources.push(value);
                }
                _ if lower.starts_with("patch") && is_numbered(&lower["patch".len()..]) => {
                    spec.patches.push(value);
                }
                _ => {}
            }
        }
        spec
    }

    pub fn macro_value(&self, name: &str) -> Option<&str> {
        self.macros.get(name).map(|s| s.as_str())
    }

    /// Replace `%{macro}` and `%macro` references to known values.
    pub fn expand(&self, text: &str) -> String {
        let mut out = text.to_string();
        let mut known: Vec<(String, String)> = self
            .macros
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        known.push(("name".into(), self.name.clone()));
        known.push(("version".into(), self.version.clone()));
        known.push(("release".into(), self.release.clone()));
        for _ in 0..4 {
            let before = out.clone();
            for (key, value) in &known {
                out = out
                    .replace(&format!("%{{{}}}", key), value)
                    .replace(&format!("%{{?{}}}", key), value);
            }
            if out == before {
                break;
            }
        }
        out
    }

    /// Number of the `SourceN` tag whose file name is `file_name`.
    pub fn source_number(&self, file_name: &str) -> Option<u32> {
        self.sources_dict.iter().find_map(|(tag, value)| {
            let expanded = self.expand(value);
            let base = expanded.rsplit('/').next().unwrap_or_default();
            if base == file_name || value == file_name {
                let digits = &tag["source".len()..];
                Some(digits.parse().unwrap_or(0))
            } else {
                None
            }
        })
    }

    /// File names of all sources after macro expansion.
    pub fn source_file_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| self.expand(s).rsplit('/').next().unwrap_or_default().to_string())
            .collect()
    }
}

fn is_numbered(suffix: &str) -> bool {
    suffix.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = "\
%global srcname anaconda
Name:           anaconda
Version:        39.32
Release:        1%{?dist}
Source0:        https://example.org/%{srcname}-%{version}.tar.bz2
Source1:        anaconda-po-39.tar.gz
Patch0:         fix-build.patch

%description
Installer.

%package -n anaconda-core
Summary: core

%prep
%autosetup -p1 -a 1
cp %{SOURCE2} po/

%files -n anaconda-core
/usr/bin/anaconda
";

    #[test]
    fn preamble_tags_and_macros() {
        let spec = SpecFile::parse(SPEC);
        assert_eq!(spec.name, "anaconda");
        assert_eq!(spec.version, "39.32");
        assert_eq!(spec.release, "1%{?dist}");
        assert_eq!(spec.sources.len(), 2);
        assert_eq!(spec.patches, vec!["fix-build.patch"]);
        assert_eq!(spec.macro_value("srcname"), Some("anaconda"));
        assert_eq!(
            spec.source_file_names()[0],
            "anaconda-39.32.tar.bz2"
        );
        assert_eq!(spec.source_number("anaconda-po-39.tar.gz"), Some(1));
    }

    #[test]
    fn sections_split_by_package() {
        let sections = SpecSections::parse(SPEC);
        assert_eq!(sections.name, "anaconda");
        assert_eq!(sections.main_section("prep")[0], "%autosetup -p1 -a 1");
        assert_eq!(
            sections.package_section("files", "anaconda-core"),
            ["/usr/bin/anaconda".to_string()]
        );
        assert!(sections.section["package"].contains_key("anaconda-core"));
        assert!(sections.main_section("install").is_empty());
    }
}
