use std::time::Duration;

use super::{StepOutcome, run_step};
use crate::cluster_adapter::ClusterAdapter;

pub struct MedusaSetupInput<'a> {
    pub namespace: &'a str,
    pub pod_selector: &'a str,
    pub admin_email: &'a str,
    pub admin_password: &'a str,
}

const HEALTH_CHECK_ATTEMPTS: u32 = 6;
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// The seed script is itself idempotent (skips once the store already
/// has >= 8 products), so a retried provisioning run never double-seeds.
pub async fn run(adapter: &ClusterAdapter, input: &MedusaSetupInput<'_>) -> Vec<StepOutcome> {
    let ns = input.namespace;
    let selector = input.pod_selector;
    let mut outcomes = Vec::with_capacity(5);

    let mut health_ok = false;
    for attempt in 0..HEALTH_CHECK_ATTEMPTS {
        let outcome = run_step(adapter, ns, selector, "health_check", &["curl", "-sf", "http://localhost:9000/health"], Duration::from_secs(5)).await;
        health_ok = outcome.succeeded;
        if attempt == HEALTH_CHECK_ATTEMPTS - 1 || health_ok {
            outcomes.push(outcome);
        }
        if health_ok {
            break;
        }
        tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;
    }

    outcomes.push(
        run_step(
            adapter,
            ns,
            selector,
            "create_admin_user",
            &["medusa", "user", "-e", input.admin_email, "-p", input.admin_password],
            Duration::from_secs(30),
        )
        .await,
    );

    tokio::time::sleep(Duration::from_secs(5)).await;

    let seed_script = format!(
        r#"set -e
BASE="http://localhost:9000"
TOKEN=$(curl -sf -X POST "$BASE/auth/user/emailpass" -H 'Content-Type: application/json' -d '{{"email":"{email}","password":"{password}"}}' | jq -r '.token')
AUTH="Authorization: Bearer $TOKEN"
EXISTING=$(curl -sf -H "$AUTH" "$BASE/admin/products?limit=1" | jq -r '.count')
if [ "$EXISTING" -ge 8 ]; then
  echo "catalog already seeded ($EXISTING products), skipping"
  exit 0
fi
SALES_CHANNEL=$(curl -sf -H "$AUTH" "$BASE/admin/sales-channels?limit=1" | jq -r '.sales_channels[0].id')
REGION=$(curl -sf -X POST -H "$AUTH" -H 'Content-Type: application/json' "$BASE/admin/regions" -d '{{"name":"North America","currency_code":"usd","countries":["us","ca"],"payment_providers":["manual"],"fulfillment_providers":["manual"]}}' | jq -r '.region.id')
curl -sf -X POST -H "$AUTH" -H 'Content-Type: application/json' "$BASE/admin/shipping-options" -d "{{\"name\":\"Standard Shipping\",\"region_id\":\"$REGION\",\"provider_id\":\"manual\",\"price_type\":\"flat_rate\",\"amount\":500,\"data\":{{}}}}" >/dev/null
curl -sf -X POST -H "$AUTH" -H 'Content-Type: application/json' "$BASE/admin/shipping-options" -d "{{\"name\":\"Express Shipping\",\"region_id\":\"$REGION\",\"provider_id\":\"manual\",\"price_type\":\"flat_rate\",\"amount\":1500,\"data\":{{}}}}" >/dev/null
for name in Apparel Home Accessories; do
  curl -sf -X POST -H "$AUTH" -H 'Content-Type: application/json' "$BASE/admin/collections" -d "{{\"title\":\"$name\"}}" >/dev/null
done
COLLECTIONS=$(curl -sf -H "$AUTH" "$BASE/admin/collections?limit=3" | jq -r '[.collections[].id] | @tsv')
i=0
for product in "Classic Tee" "Canvas Tote" "Ceramic Mug" "Desk Lamp" "Wool Scarf" "Leather Wallet" "Throw Pillow" "Travel Mug"; do
  collection_id=$(echo "$COLLECTIONS" | cut -f$((i % 3 + 1)))
  curl -sf -X POST -H "$AUTH" -H 'Content-Type: application/json' "$BASE/admin/products" -d "{{\"title\":\"$product\",\"collection_id\":\"$collection_id\",\"sales_channels\":[{{\"id\":\"$SALES_CHANNEL\"}}],\"options\":[{{\"title\":\"Size\"}}],\"variants\":[{{\"title\":\"Small\",\"prices\":[{{\"currency_code\":\"usd\",\"amount\":2500}}],\"options\":[{{\"value\":\"Small\"}}]}},{{\"title\":\"Large\",\"prices\":[{{\"currency_code\":\"usd\",\"amount\":2500}}],\"options\":[{{\"value\":\"Large\"}}]}}]}}" >/dev/null
  i=$((i + 1))
done
echo "seeded 8 products across 3 collections"
"#,
        email = input.admin_email,
        password = input.admin_password,
    );

    outcomes.push(run_step(adapter, ns, selector, "seed_catalog", &["sh", "-c", &seed_script], Duration::from_secs(180)).await);

    outcomes
}
