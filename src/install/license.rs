//! License acceptance for modules that declare `RequireLicenseAcceptance = true`.

use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

use crate::consent::{ConsentSession, ConsentTopic};
use crate::runtime::Runtime;

use super::error::{ErrorKind, PackageError};

pub const LICENSE_FILE_NAME: &str = "License.txt";

/// Textual detection of the acceptance directive. Commented-out directives
/// (`# ...` and ` * ...` block comment lines) do not count.
pub struct LicensePolicy {
    directive: Regex,
    hash_commented: Regex,
    star_commented: Regex,
}

impl LicensePolicy {
    pub fn new() -> Result<Self> {
        Ok(Self {
            directive: Regex::new(r"RequireLicenseAcceptance\s*=\s*true")?,
            hash_commented: Regex::new(r"#\s*RequireLicenseAcceptance\s*=\s*true")?,
            star_commented: Regex::new(r"\*\s*RequireLicenseAcceptance\s*=\s*true")?,
        })
    }

    pub fn requires_acceptance(&self, manifest_text: &str) -> bool {
        self.directive.is_match(manifest_text)
            && !self.hash_commented.is_match(manifest_text)
            && !self.star_commented.is_match(manifest_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseState {
    NotChecked,
    NoAcceptanceNeeded,
    RequiresAcceptance,
    AwaitingUserConsent,
    Accepted,
    Declined,
}

/// License gate for one install operation.
///
/// Once the user accepts one license, every later module in the same
/// operation is accepted without asking.
pub struct LicenseGate {
    policy: LicensePolicy,
    accept_license: bool,
    accepted: bool,
}

impl LicenseGate {
    pub fn new(accept_license: bool) -> Result<Self> {
        Ok(Self {
            policy: LicensePolicy::new()?,
            accept_license,
            accepted: false,
        })
    }

    /// Run the gate for the module staged in `module_dir`.
    ///
    /// Returns the terminal state, which is never `Declined`: a decline is
    /// reported as a `LicenseNotAccepted` error.
    pub fn check<R: Runtime + ?Sized>(
        &mut self,
        runtime: &R,
        package: &str,
        module_dir: &Path,
        manifest_text: &str,
        session: &mut ConsentSession<'_>,
    ) -> Result<LicenseState, PackageError> {
        let mut state = LicenseState::NotChecked;
        loop {
            debug!("{}: license state {:?}", package, state);
            state = match state {
                LicenseState::NotChecked => {
                    if self.policy.requires_acceptance(manifest_text) {
                        LicenseState::RequiresAcceptance
                    } else {
                        LicenseState::NoAcceptanceNeeded
                    }
                }
                LicenseState::RequiresAcceptance if self.accepted => LicenseState::Accepted,
                LicenseState::RequiresAcceptance => LicenseState::AwaitingUserConsent,
                LicenseState::AwaitingUserConsent => {
                    let license_path = module_dir.join(LICENSE_FILE_NAME);
                    if !runtime.exists(&license_path) {
                        return Err(PackageError::new(
                            ErrorKind::LicenseTextMissing,
                            package,
                            format!(
                                "{} requires license acceptance but ships no {}",
                                package, LICENSE_FILE_NAME
                            ),
                        ));
                    }
                    if self.accept_license {
                        LicenseState::Accepted
                    } else {
                        let text = runtime.read_to_string(&license_path).map_err(|e| {
                            PackageError::from_error(ErrorKind::LicenseTextMissing, package, &e)
                        })?;
                        let question = format!(
                            "License acceptance\n\n{}\n\nDo you accept the license terms for module '{}'?",
                            text.trim_end(),
                            package
                        );
                        let yes = session
                            .ask(ConsentTopic::License, &question)
                            .map_err(|e| {
                                PackageError::from_error(ErrorKind::LicenseNotAccepted, package, &e)
                            })?;
                        if yes {
                            self.accepted = true;
                            LicenseState::Accepted
                        } else {
                            LicenseState::Declined
                        }
                    }
                }
                LicenseState::Declined => {
                    return Err(PackageError::new(
                        ErrorKind::LicenseNotAccepted,
                        package,
                        format!(
                            "License acceptance is required for module '{}'. Rerun with --accept-license to accept the license terms.",
                            package
                        ),
                    ));
                }
                done @ (LicenseState::Accepted | LicenseState::NoAcceptanceNeeded) => {
                    return Ok(done);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{ConsentAnswer, MockConsent};
    use crate::runtime::MockRuntime;
    use mockall::predicate::*;
    use std::path::PathBuf;

    const GATED: &str = "ModuleVersion = 1.0\nRequireLicenseAcceptance = true\n";

    #[test]
    fn test_detection() {
        let policy = LicensePolicy::new().unwrap();
        assert!(policy.requires_acceptance(GATED));
        assert!(policy.requires_acceptance("RequireLicenseAcceptance=true"));
        assert!(!policy.requires_acceptance("RequireLicenseAcceptance = false"));
        assert!(!policy.requires_acceptance("# RequireLicenseAcceptance = true"));
        assert!(!policy.requires_acceptance("/*\n * RequireLicenseAcceptance = true\n */"));
        // Any commented copy disables detection, even next to a live one
        assert!(!policy.requires_acceptance(
            "#RequireLicenseAcceptance = true\nRequireLicenseAcceptance = true"
        ));
    }

    fn runtime_with_license(text: Option<&'static str>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/stage/Foo/License.txt");
        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(move |_| text.is_some());
        if let Some(text) = text {
            runtime
                .expect_read_to_string()
                .with(eq(path))
                .returning(move |_| Ok(text.to_string()));
        }
        runtime
    }

    #[test]
    fn test_not_required() {
        let consent = MockConsent::new();
        let mut session = ConsentSession::new(&consent);
        let mut gate = LicenseGate::new(false).unwrap();
        let state = gate
            .check(
                &MockRuntime::new(),
                "Foo",
                Path::new("/stage/Foo"),
                "ModuleVersion = 1.0",
                &mut session,
            )
            .unwrap();
        assert_eq!(state, LicenseState::NoAcceptanceNeeded);
    }

    #[test]
    fn test_missing_license_text_fails_even_with_accept_flag() {
        let consent = MockConsent::new();
        let mut session = ConsentSession::new(&consent);
        for accept in [false, true] {
            let mut gate = LicenseGate::new(accept).unwrap();
            let err = gate
                .check(
                    &runtime_with_license(None),
                    "Foo",
                    Path::new("/stage/Foo"),
                    GATED,
                    &mut session,
                )
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::LicenseTextMissing);
        }
    }

    #[test]
    fn test_accept_flag_skips_prompt() {
        let mut consent = MockConsent::new();
        consent.expect_confirm().never();
        let mut session = ConsentSession::new(&consent);
        let mut gate = LicenseGate::new(true).unwrap();

        let state = gate
            .check(
                &runtime_with_license(Some("terms")),
                "Foo",
                Path::new("/stage/Foo"),
                GATED,
                &mut session,
            )
            .unwrap();
        assert_eq!(state, LicenseState::Accepted);
    }

    #[test]
    fn test_decline_fails_with_license_not_accepted() {
        let mut consent = MockConsent::new();
        consent
            .expect_confirm()
            .withf(|q| q.contains("terms of use") && q.contains("'Foo'"))
            .times(1)
            .returning(|_| Ok(ConsentAnswer::No));
        let mut session = ConsentSession::new(&consent);
        let mut gate = LicenseGate::new(false).unwrap();

        let err = gate
            .check(
                &runtime_with_license(Some("terms of use")),
                "Foo",
                Path::new("/stage/Foo"),
                GATED,
                &mut session,
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LicenseNotAccepted);
    }

    #[test]
    fn test_acceptance_is_operation_scoped() {
        let mut consent = MockConsent::new();
        consent
            .expect_confirm()
            .times(1)
            .returning(|_| Ok(ConsentAnswer::Yes));
        let mut session = ConsentSession::new(&consent);
        let mut gate = LicenseGate::new(false).unwrap();

        let first = gate
            .check(
                &runtime_with_license(Some("terms")),
                "Foo",
                Path::new("/stage/Foo"),
                GATED,
                &mut session,
            )
            .unwrap();
        assert_eq!(first, LicenseState::Accepted);

        // Second module has no License.txt and is still accepted without asking
        let second = gate
            .check(
                &MockRuntime::new(),
                "Bar",
                Path::new("/stage/Bar"),
                GATED,
                &mut session,
            )
            .unwrap();
        assert_eq!(second, LicenseState::Accepted);
    }
}
