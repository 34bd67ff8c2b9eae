//! Shared test doubles and behavioural tests.


use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use trellis_installer::InstallError;

use crate::runtime::{ActivationContext, ExtensionProvisioner, ExtensionRuntime, SetupError};
use crate::spec::ExtensionSpec;

/// Provisioner that "installs" every extension under `/ext/<name>` and can
/// be told to fail for specific names.
#[derive(Debug, Default)]
pub(crate) struct FakeProvisioner {
    pub(crate) provisioned: Vec<String>,
    pub(crate) broken: Vec<String>,
}

impl FakeProvisioner {
    pub(crate) fn broken(names: &[&str]) -> Self {
        Self {
            provisioned: Vec::new(),
            broken: names.iter().map(|name| (*name).to_owned()).collect(),
        }
    }
}

impl ExtensionProvisioner for FakeProvisioner {
    fn provision(&mut self, spec: &ExtensionSpec) -> Result<Utf8PathBuf, InstallError> {
        if self.broken.iter().any(|name| name == spec.name()) {
            return Err(InstallError::Registry {
                url: format!("https://registry.test/{}", spec.name()),
                status: 404,
            });
        }
        self.provisioned.push(spec.name().to_owned());
        Ok(Utf8PathBuf::from(format!("/ext/{}", spec.name())))
    }
}

/// Runtime that records every setup call and fails on request.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingRuntime {
    setups: Arc<Mutex<Vec<ActivationContext>>>,
    failures: Arc<Mutex<HashMap<String, usize>>>,
}

impl RecordingRuntime {
    /// Makes the next `times` setups of `name` fail.
    pub(crate) fn fail(&self, name: &str, times: usize) {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(name.to_owned(), times);
    }

    /// Names passed to `setup`, in call order.
    pub(crate) fn setup_names(&self) -> Vec<String> {
        self.setups
            .lock()
            .expect("setups lock")
            .iter()
            .map(|context| context.name().to_owned())
            .collect()
    }

    /// Context of the last setup of `name`.
    pub(crate) fn context(&self, name: &str) -> Option<ActivationContext> {
        self.setups
            .lock()
            .expect("setups lock")
            .iter()
            .rev()
            .find(|context| context.name() == name)
            .cloned()
    }
}

impl ExtensionRuntime for RecordingRuntime {
    fn setup(&mut self, context: &ActivationContext) -> Result<(), SetupError> {
        self.setups
            .lock()
            .expect("setups lock")
            .push(context.clone());
        let mut failures = self.failures.lock().expect("failures lock");
        match failures.get_mut(context.name()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SetupError::new(format!("{} exploded", context.name())))
            }
            _ => Ok(()),
        }
    }
}
