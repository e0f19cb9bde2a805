//! Supported languages and their compile/run commands

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sandbox::SANDBOX_WORKDIR;

/// Languages the sandbox image can build and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Python,
    Cpp,
    C,
    JavaScript,
    Go,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Java,
        Language::Python,
        Language::Cpp,
        Language::C,
        Language::JavaScript,
        Language::Go,
    ];

    /// Name of the staged source file
    pub fn file_name(&self) -> &'static str {
        match self {
            Language::Java => "Main.java",
            Language::Python => "main.py",
            Language::Cpp => "main.cpp",
            Language::C => "main.c",
            Language::JavaScript => "main.js",
            Language::Go => "main.go",
        }
    }

    /// Compile step, if the language has one
    pub fn compile_command(&self) -> Option<Vec<String>> {
        let source = self.source_path();
        let binary = format!("{}/main", SANDBOX_WORKDIR);
        let argv: Vec<String> = match self {
            Language::Java => vec![
                "javac".into(),
                "-encoding".into(),
                "utf-8".into(),
                source,
            ],
            Language::Cpp => vec!["g++".into(), "-O2".into(), "-o".into(), binary, source],
            Language::C => vec!["gcc".into(), "-O2".into(), "-o".into(), binary, source],
            Language::Go => vec!["go".into(), "build".into(), "-o".into(), binary, source],
            Language::Python | Language::JavaScript => return None,
        };
        Some(argv)
    }

    pub fn run_command(&self) -> Vec<String> {
        match self {
            Language::Java => vec![
                "java".into(),
                "-cp".into(),
                SANDBOX_WORKDIR.into(),
                "Main".into(),
            ],
            Language::Python => vec!["python3".into(), self.source_path()],
            Language::JavaScript => vec!["node".into(), self.source_path()],
            Language::Cpp | Language::C | Language::Go => {
                vec![format!("{}/main", SANDBOX_WORKDIR)]
            }
        }
    }

    fn source_path(&self) -> String {
        format!("{}/{}", SANDBOX_WORKDIR, self.file_name())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "python" | "python3" | "py" => Ok(Language::Python),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "go" | "golang" => Ok(Language::Go),
            _ => Err(Error::InvalidInput(format!("Unsupported language: {}", s))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Java => write!(f, "java"),
            Language::Python => write!(f, "python"),
            Language::Cpp => write!(f, "cpp"),
            Language::C => write!(f, "c"),
            Language::JavaScript => write!(f, "javascript"),
            Language::Go => write!(f, "go"),
        }
    }
}
