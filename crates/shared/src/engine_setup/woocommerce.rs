use std::time::Duration;

use super::{StepOutcome, run_step};
use crate::cluster_adapter::ClusterAdapter;

pub struct WoocommerceSetupInput<'a> {
    pub namespace: &'a str,
    pub pod_selector: &'a str,
    pub site_url: &'a str,
    pub admin_email: &'a str,
    pub admin_username: &'a str,
    pub admin_password: &'a str,
    pub theme: &'a str,
}

/// All nine steps run unconditionally; each wraps its own failure so a
/// broken theme install, say, never blocks onboarding.
pub async fn run(adapter: &ClusterAdapter, input: &WoocommerceSetupInput<'_>) -> Vec<StepOutcome> {
    let ns = input.namespace;
    let selector = input.pod_selector;
    let timeout = Duration::from_secs(60);
    let mut outcomes = Vec::with_capacity(9);

    outcomes.push(run_step(adapter, ns, selector, "wp_cli_install", &["sh", "-c", "which wp || install-wp-cli.sh"], timeout).await);

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "core_install",
            &[
                "wp",
                "core",
                "install",
                "--url",
                input.site_url,
                "--title=Store",
                "--admin_user",
                input.admin_username,
                "--admin_password",
                input.admin_password,
                "--admin_email",
                input.admin_email,
                "--skip-email",
            ],
            timeout,
        )
        .await,
    );

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "plugin_install",
            &["wp", "plugin", "install", "woocommerce", "--version=8.9.3", "--activate"],
            timeout,
        )
        .await,
    );

    outcomes.push(run_step(adapter, ns, selector, "theme_install", &["wp", "theme", "install", input.theme, "--activate"], timeout).await);

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "storefront_pages",
            &["wp", "wc", "--user=1", "tool", "run", "install_pages"],
            Duration::from_secs(30),
        )
        .await,
    );

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "write_options",
            &["wp", "option", "update", "woocommerce_default_country", "US:CA"],
            Duration::from_secs(15),
        )
        .await,
    );

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "enable_cod",
            &["wp", "option", "patch", "update", "woocommerce_cod_settings", "enabled", "yes"],
            Duration::from_secs(15),
        )
        .await,
    );

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "seed_catalog",
            &["wp", "wc", "product", "create", "--count=5", "--user=1"],
            Duration::from_secs(60),
        )
        .await,
    );

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "flush_and_verify",
            &["wp", "cache", "flush"],
            Duration::from_secs(15),
        )
        .await,
    );

    outcomes
}
