use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized error categories used for fixer lookup, retry filtering and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Format,
    Import,
    Test,
    Coverage,
    Security,
    Performance,
    Dependency,
    Timeout,
    Exception,
    Unknown,
}

impl ErrorCategory {
    pub fn all() -> &'static [ErrorCategory] {
        &[
            ErrorCategory::Syntax,
            ErrorCategory::Format,
            ErrorCategory::Import,
            ErrorCategory::Test,
            ErrorCategory::Coverage,
            ErrorCategory::Security,
            ErrorCategory::Performance,
            ErrorCategory::Dependency,
            ErrorCategory::Timeout,
            ErrorCategory::Exception,
            ErrorCategory::Unknown,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Format => "format",
            ErrorCategory::Import => "import",
            ErrorCategory::Test => "test",
            ErrorCategory::Coverage => "coverage",
            ErrorCategory::Security => "security",
            ErrorCategory::Performance => "performance",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Exception => "exception",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Whether an auto-fixer may exist for this category.
    pub fn is_fixable(self) -> bool {
        !matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::Exception | ErrorCategory::Unknown
        )
    }

    /// Classify free-form error text by keyword.
    pub fn normalize(raw: &str) -> ErrorCategory {
        let lower = raw.to_lowercase();
        if let Ok(exact) = lower.trim().parse::<ErrorCategory>() {
            return exact;
        }

        const RULES: &[(&[&str], ErrorCategory)] = &[
            (&["timed out", "timeout", "deadline"], ErrorCategory::Timeout),
            (&["panic", "exception", "traceback", "crash"], ErrorCategory::Exception),
            (&["syntax", "parse error", "unexpected token"], ErrorCategory::Syntax),
            (&["format", "fmt", "lint", "style", "whitespace"], ErrorCategory::Format),
            (&["import", "unresolved", "cannot find module", "no module named"], ErrorCategory::Import),
            (&["coverage"], ErrorCategory::Coverage),
            (&["security", "vulnerab", "cve-", "secret", "unsafe"], ErrorCategory::Security),
            (&["performance", "benchmark", "slow", "latency", "regression"], ErrorCategory::Performance),
            (&["dependency", "dependencies", "missing artifact", "lockfile", "version conflict"], ErrorCategory::Dependency),
            (&["test", "assert", "expected"], ErrorCategory::Test),
        ];

        RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(_, category)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Suggested next steps shown in manual-intervention reports and abort messages.
    pub fn suggested_actions(self) -> &'static [&'static str] {
        match self {
            ErrorCategory::Syntax => &[
                "Open the files named in the error and fix the syntax errors",
                "Run the compiler or parser locally before committing",
            ],
            ErrorCategory::Format => &[
                "Run the project formatter",
                "Run the linter and address its warnings",
            ],
            ErrorCategory::Import => &[
                "Check import paths and module names",
                "Install or declare any missing packages",
            ],
            ErrorCategory::Test => &[
                "Run the failing tests locally and inspect the assertions",
                "Fix the code or update tests that encode outdated behaviour",
            ],
            ErrorCategory::Coverage => &[
                "Add tests for the uncovered code paths",
                "Review whether the coverage threshold is appropriate",
            ],
            ErrorCategory::Security => &[
                "Review the reported vulnerabilities before proceeding",
                "Upgrade affected dependencies or remove leaked secrets",
                "Ask a security reviewer to sign off",
            ],
            ErrorCategory::Performance => &[
                "Profile the regressed code path",
                "Compare benchmark results against the main branch",
            ],
            ErrorCategory::Dependency => &[
                "Store and validate the missing artifact",
                "Check that required tools and packages are installed",
            ],
            ErrorCategory::Timeout => &[
                "Check for hung processes or slow external services",
                "Raise timeout_secs for this hook if the checks are legitimately slow",
            ],
            ErrorCategory::Exception => &[
                "Inspect .phasegate/logs for the full error",
                "Re-run the hook with -v for debug output",
            ],
            ErrorCategory::Unknown => &[
                "Read the check output above for details",
                "Re-run the hook with -v for debug output",
            ],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ErrorCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("Invalid error category '{}'", s))
    }
}
