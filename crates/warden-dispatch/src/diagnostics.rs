use warden_access::DeploymentConfig;

pub const DEBUG_INFO_COMMAND: &str = "debuginfo";

/// Reply for the hidden `debuginfo` command; only test deployments answer.
pub fn debug_info_reply(deployment: &DeploymentConfig) -> Option<String> {
    deployment.is_isolated_test().then(|| {
        format!(
            "```You are testing the latest commit of branch or pull request: {}```",
            deployment.branch_name
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_debug_info_reply_names_branch_in_test_mode() {
        let reply = debug_info_reply(&DeploymentConfig::isolated_test("PR-311")).expect("reply");
        assert!(reply.contains("PR-311"));
        assert!(debug_info_reply(&DeploymentConfig::production()).is_none());
    }
}
