//! Consistent renaming of a function's manifests
//!
//! A rename touches every name, label and selector that ties the workload,
//! service and autoscaler together. Chained functions also carry the
//! address of their downstream function after an `-addr` argument; that
//! host label gets the new name's suffix so chains deployed together keep
//! talking to each other.

use crate::error::{DeployError, DeployResult};
use crate::manifest::{ManifestSet, WorkloadManifest, RELAY_CONTAINER};

/// Argument preceding a downstream address
pub const ADDR_FLAG: &str = "-addr";

const APP_LABEL: &str = "app";
const MAX_NAME_LEN: usize = 63;
const AUTOSCALER_SUFFIX: &str = "-hpa";

/// Where the downstream address lives and what it was in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChainAddress {
    container: usize,
    arg: usize,
    host_label: String,
    /// Everything from the first `.` on
    rest: String,
}

impl ChainAddress {
    pub(crate) fn find(workload: &WorkloadManifest) -> DeployResult<Option<Self>> {
        for (container, spec) in workload.spec.template.spec.containers.iter().enumerate() {
            let Some(flag) = spec.args.iter().position(|a| a == ADDR_FLAG) else {
                continue;
            };
            let arg = flag + 1;
            let address = spec.args.get(arg).ok_or_else(|| {
                DeployError::Invalid(format!(
                    "container '{}' has {} without an address",
                    spec.name, ADDR_FLAG
                ))
            })?;
            let dot = address.find('.').ok_or_else(|| {
                DeployError::Invalid(format!(
                    "downstream address '{}' has no domain part",
                    address
                ))
            })?;

            return Ok(Some(Self {
                container,
                arg,
                host_label: address[..dot].to_string(),
                rest: address[dot..].to_string(),
            }));
        }
        Ok(None)
    }

    fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}{}", self.host_label, suffix, self.rest)
    }
}

/// The trailing `-xxxx` of a minted name, dash included.
pub fn name_suffix(name: &str) -> Option<&str> {
    name.rfind('-').map(|i| &name[i..])
}

/// `reserved` characters are kept free for suffixes appended to derived
/// object names.
fn check_name(name: &str, reserved: usize) -> Result<(), String> {
    let max = MAX_NAME_LEN - reserved;
    if name.is_empty() || name.len() > max {
        return Err(format!("length must be 1..={}", max));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("only lowercase letters, digits and '-' are allowed".into());
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err("must start and end with a letter or digit".into());
    }
    Ok(())
}

impl ManifestSet {
    /// Rename the workload, service and autoscaler to `new_name`.
    ///
    /// Every new value is computed before anything is assigned, so an error
    /// leaves the set as it was. Renaming is idempotent.
    pub fn rename(&mut self, new_name: &str) -> DeployResult<()> {
        let reject = |reason: String| DeployError::Rename {
            name: new_name.to_string(),
            reason,
        };
        let reserved = match self.autoscaler {
            Some(_) => AUTOSCALER_SUFFIX.len(),
            None => 0,
        };
        check_name(new_name, reserved).map_err(reject)?;

        let address = match &self.chain {
            Some(chain) => {
                let suffix = name_suffix(new_name).ok_or_else(|| {
                    reject("a chained function needs a '-<suffix>' name".into())
                })?;
                let present = self
                    .workload
                    .spec
                    .template
                    .spec
                    .containers
                    .get(chain.container)
                    .is_some_and(|c| c.args.len() > chain.arg);
                if !present {
                    return Err(reject("downstream address argument disappeared".into()));
                }
                Some((chain.container, chain.arg, chain.with_suffix(suffix)))
            }
            None => None,
        };
        let name = new_name.to_string();

        let workload = &mut self.workload;
        workload.metadata.name = name.clone();
        workload.metadata.labels.insert(APP_LABEL.into(), name.clone());
        workload
            .spec
            .selector
            .match_labels
            .insert(APP_LABEL.into(), name.clone());
        workload
            .spec
            .template
            .metadata
            .labels
            .insert(APP_LABEL.into(), name.clone());
        for container in workload.spec.template.spec.containers.iter_mut() {
            if container.name != RELAY_CONTAINER {
                container.name = name.clone();
            }
        }
        if let Some((container, arg, address)) = address {
            workload.spec.template.spec.containers[container].args[arg] = address;
        }

        self.service.metadata.name = name.clone();
        self.service.spec.selector.insert(APP_LABEL.into(), name.clone());

        if let Some(autoscaler) = self.autoscaler.as_mut() {
            autoscaler.metadata.name = format!("{}{}", name, AUTOSCALER_SUFFIX);
            autoscaler.spec.scale_target_ref.name = name;
        }
        Ok(())
    }

    /// Current downstream address, for chained functions.
    pub fn downstream_address(&self) -> Option<&str> {
        let chain = self.chain.as_ref()?;
        self.workload
            .spec
            .template
            .spec
            .containers
            .get(chain.container)?
            .args
            .get(chain.arg)
            .map(String::as_str)
    }
}
