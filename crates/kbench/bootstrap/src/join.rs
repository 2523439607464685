//! Join command extraction from the master's cluster-initialization log
//!
//! `kubeadm init` prints the worker join command split over two lines:
//!
//! ```text
//! kubeadm join 10.0.1.1:6443 --token abcdef.0123456789abcdef \
//!     --discovery-token-ca-cert-hash sha256:0f3c...
//! ```

use regex::Regex;
use std::sync::LazyLock;

static JOIN_LINE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?P<join>kubeadm[^\\\n]*)\\"));

static HASH_FRAGMENT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?P<hash>--discovery-token-ca-cert-hash\s+\S+)"));

/// Build the `sudo`-prefixed join command from log text, if both parts are
/// present yet.
pub fn extract_join_command(log: &str) -> Option<String> {
    let join = JOIN_LINE.as_ref().ok()?.captures(log)?.name("join")?;
    let rest = &log[join.end()..];
    let hash = HASH_FRAGMENT.as_ref().ok()?.captures(rest)?.name("hash")?;

    Some(format!(
        "sudo {} {}",
        join.as_str().trim_end(),
        hash.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LOG: &str = "\
[init] Using Kubernetes version: v1.25.9
Your Kubernetes control-plane has initialized successfully!
Then you can join any number of worker nodes by running the following on each as root:

kubeadm join 10.0.1.1:6443 --token abcdef.0123456789abcdef \\
\t--discovery-token-ca-cert-hash sha256:0f3cb1a8b2c4d6e8f0a1b3c5d7e9f1a2b4c6d8e0f2a4b6c8d0e2f4a6b8c0d2e4
All nodes need to be joined in the cluster. Have you joined all nodes? (y/n): ";

    #[test]
    fn test_extracts_both_fragments() {
        let cmd = extract_join_command(LOG).unwrap();
        assert_eq!(
            cmd,
            "sudo kubeadm join 10.0.1.1:6443 --token abcdef.0123456789abcdef \
             --discovery-token-ca-cert-hash sha256:0f3cb1a8b2c4d6e8f0a1b3c5d7e9f1a2b4c6d8e0f2a4b6c8d0e2f4a6b8c0d2e4"
        );
    }

    #[test]
    fn test_incomplete_log() {
        assert_eq!(extract_join_command(""), None);
        assert_eq!(extract_join_command("[init] Using Kubernetes version"), None);
        assert_eq!(
            extract_join_command("kubeadm join 10.0.1.1:6443 --token abc.def \\\n"),
            None
        );
    }

    proptest! {
        #[test]
        fn join_command_contains_both_parts(
            ip in "10\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
            token in "[a-z0-9]{6}\\.[a-z0-9]{16}",
            hash in "[0-9a-f]{64}",
            prefix in "[A-Za-z \\[\\]]{0,40}",
        ) {
            let log = format!(
                "{prefix}\nkubeadm join {ip}:6443 --token {token} \\\n    --discovery-token-ca-cert-hash sha256:{hash} \n"
            );
            let cmd = extract_join_command(&log).unwrap();
            prop_assert!(cmd.starts_with("sudo kubeadm join"));
            let token_part = format!("--token {}", token);
            let hash_part = format!("--discovery-token-ca-cert-hash sha256:{}", hash);
            prop_assert!(cmd.contains(&token_part));
            prop_assert!(cmd.ends_with(&hash_part));
        }
    }
}
