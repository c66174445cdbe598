use reqwest::StatusCode;
use serde_json::json;

use tierstock_api::middleware::{ACTOR_HEADER, NETWORK_HEADER};
use tierstock_core::NetworkId;
use tierstock_ledger::CustodianId;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = tierstock_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One caller identity: a network plus the custodian acting in it.
#[derive(Clone)]
struct Session {
    network: String,
    actor: String,
}

impl Session {
    fn new(network: NetworkId, actor: CustodianId) -> Self {
        Self {
            network: network.to_string(),
            actor: actor.to_string(),
        }
    }

    fn as_actor(&self, actor: &str) -> Self {
        Self {
            network: self.network.clone(),
            actor: actor.to_string(),
        }
    }

    fn get(&self, client: &reqwest::Client, url: String) -> reqwest::RequestBuilder {
        client
            .get(url)
            .header(NETWORK_HEADER, &self.network)
            .header(ACTOR_HEADER, &self.actor)
    }

    fn post(&self, client: &reqwest::Client, url: String) -> reqwest::RequestBuilder {
        client
            .post(url)
            .header(NETWORK_HEADER, &self.network)
            .header(ACTOR_HEADER, &self.actor)
    }
}

async fn get_json_eventually(
    client: &reqwest::Client,
    session: &Session,
    url: String,
) -> serde_json::Value {
    get_json_until(client, session, url, |_| true).await
}

/// Poll a read endpoint until it answers 200 with a body the predicate
/// accepts. Command path and projection update are eventually
/// consistent; list endpoints answer 200 (empty) before catching up.
async fn get_json_until(
    client: &reqwest::Client,
    session: &Session,
    url: String,
    ready: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..50 {
        let res = session.get(client, url.clone()).send().await.unwrap();
        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if ready(&body) {
                return body;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("resource did not become visible in projection within timeout: {url}");
}

/// Open a network and register the admin/leader/agent chain.
/// Returns (admin session, leader id, agent id).
async fn seeded_chain(client: &reqwest::Client, srv: &TestServer) -> (Session, String, String) {
    let bootstrap = Session::new(NetworkId::new(), CustodianId::new());

    let res = bootstrap
        .post(client, format!("{}/network/open", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = bootstrap
        .post(client, format!("{}/network/custodians", srv.base_url))
        .json(&json!({ "tier": "admin", "display_name": "Warehouse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let admin_id = body["id"].as_str().unwrap().to_string();
    let admin = bootstrap.as_actor(&admin_id);

    let res = admin
        .post(client, format!("{}/network/custodians", srv.base_url))
        .json(&json!({ "tier": "leader", "parent": admin_id, "display_name": "North" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let leader_id = body["id"].as_str().unwrap().to_string();

    let res = admin
        .post(client, format!("{}/network/custodians", srv.base_url))
        .json(&json!({ "tier": "agent", "parent": leader_id, "display_name": "Agent A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let agent_id = body["id"].as_str().unwrap().to_string();

    (admin, leader_id, agent_id)
}

#[tokio::test]
async fn session_headers_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn context_is_derived_from_headers() {
    let srv = TestServer::spawn().await;

    let network_id = NetworkId::new();
    let actor_id = CustodianId::new();
    let session = Session::new(network_id, actor_id);

    let client = reqwest::Client::new();
    let res = session
        .get(&client, format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["network_id"].as_str().unwrap(), network_id.to_string());
    assert_eq!(body["actor_id"].as_str().unwrap(), actor_id.to_string());
}

#[tokio::test]
async fn allocation_chain_receive_allocate_query() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (admin, leader_id, _agent_id) = seeded_chain(&client, &srv).await;

    let variant = uuid::Uuid::now_v7().to_string();

    let res = admin
        .post(&client, format!("{}/stock/receive", srv.base_url))
        .json(&json!({
            "variant_id": variant,
            "quantity": 100,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .post(&client, format!("{}/stock/allocate", srv.base_url))
        .json(&json!({
            "parent": admin.actor,
            "child": leader_id,
            "variant_id": variant,
            "quantity": 40,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Leader position lands in the read model.
    let body = get_json_until(
        &client,
        &admin,
        format!("{}/stock/positions/{}", srv.base_url, leader_id),
        |b| !b["positions"].as_array().unwrap().is_empty(),
    )
    .await;
    let row = &body["positions"][0];
    assert_eq!(row["quantity"], 40);
    assert_eq!(row["variant_id"].as_str().unwrap(), variant);

    // Availability is authoritative: the admin keeps its high-water
    // total, minus what sits below.
    let res = admin
        .get(
            &client,
            format!(
                "{}/stock/availability/{}/{}",
                srv.base_url, admin.actor, variant
            ),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let availability: serde_json::Value = res.json().await.unwrap();
    assert_eq!(availability["total"], 100);
    assert_eq!(availability["allocated_below"], 40);
    assert_eq!(availability["available"], 60);
}

#[tokio::test]
async fn over_allocation_is_rejected_with_detail() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (admin, leader_id, _agent_id) = seeded_chain(&client, &srv).await;

    let variant = uuid::Uuid::now_v7().to_string();

    let res = admin
        .post(&client, format!("{}/stock/receive", srv.base_url))
        .json(&json!({
            "variant_id": variant,
            "quantity": 100,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .post(&client, format!("{}/stock/allocate", srv.base_url))
        .json(&json!({
            "parent": admin.actor,
            "child": leader_id,
            "variant_id": variant,
            "quantity": 1000,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["requested"], 1000);
    assert_eq!(body["available"], 100);
}

#[tokio::test]
async fn order_lifecycle_place_advance_remit() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (admin, leader_id, agent_id) = seeded_chain(&client, &srv).await;
    let leader = admin.as_actor(&leader_id);
    let agent = admin.as_actor(&agent_id);

    let variant = uuid::Uuid::now_v7().to_string();

    // Stock flows admin -> leader -> agent.
    let res = admin
        .post(&client, format!("{}/stock/receive", srv.base_url))
        .json(&json!({
            "variant_id": variant,
            "quantity": 100,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .post(&client, format!("{}/stock/allocate", srv.base_url))
        .json(&json!({
            "parent": admin.actor,
            "child": leader_id,
            "variant_id": variant,
            "quantity": 40,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = leader
        .post(&client, format!("{}/stock/allocate", srv.base_url))
        .json(&json!({
            "parent": leader_id,
            "child": agent_id,
            "variant_id": variant,
            "quantity": 15,
            "prices": { "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The agent sells 5 units.
    let res = agent
        .post(&client, format!("{}/orders", srv.base_url))
        .json(&json!({
            "items": [{ "variant_id": variant, "quantity": 5, "unit_price": 5000 }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let order_id = body["id"].as_str().unwrap().to_string();

    // Leader then admin advance; the admin advance approves.
    let res = leader
        .post(
            &client,
            format!("{}/orders/{}/advance", srv.base_url, order_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .post(
            &client,
            format!("{}/orders/{}/advance", srv.base_url, order_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let order = get_json_eventually(
        &client,
        &admin,
        format!("{}/orders/{}", srv.base_url, order_id),
    )
    .await;
    assert_eq!(order["status"], "approved");
    assert_eq!(order["stage"], "admin_approved");

    // Remit: 10 leftover units go back, the sold order is frozen in.
    let res = agent
        .post(&client, format!("{}/remittances", srv.base_url))
        .json(&json!({
            "leader": leader_id,
            "order_ids": [order_id],
            "signature_ref": "s3://signatures/cycle-1.png",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let record: serde_json::Value = res.json().await.unwrap();
    assert_eq!(record["total_units"], 10);
    assert_eq!(record["orders_count"], 1);
    assert_eq!(record["total_revenue"], 25_000);

    // The frozen record is queryable once the projection catches up.
    let remittance_id = record["id"].as_str().unwrap();
    let fetched = get_json_eventually(
        &client,
        &admin,
        format!("{}/remittances/{}", srv.base_url, remittance_id),
    )
    .await;
    assert_eq!(fetched["total_revenue"], 25_000);
    assert_eq!(fetched["agent"].as_str().unwrap(), agent_id);
}

#[tokio::test]
async fn request_workflow_submit_approve() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (admin, leader_id, agent_id) = seeded_chain(&client, &srv).await;
    let leader = admin.as_actor(&leader_id);
    let agent = admin.as_actor(&agent_id);

    let variant = uuid::Uuid::now_v7().to_string();

    let res = admin
        .post(&client, format!("{}/stock/receive", srv.base_url))
        .json(&json!({
            "variant_id": variant,
            "quantity": 100,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .post(&client, format!("{}/stock/allocate", srv.base_url))
        .json(&json!({
            "parent": admin.actor,
            "child": leader_id,
            "variant_id": variant,
            "quantity": 40,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Agent asks its leader for 10 units.
    let res = agent
        .post(&client, format!("{}/requests", srv.base_url))
        .json(&json!({
            "items": [{ "variant_id": variant, "quantity": 10 }],
            "notes": "restock for the weekend",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let request_id = body["ids"][0].as_str().unwrap().to_string();

    // It shows up in the leader's pending queue.
    let queue = get_json_until(
        &client,
        &leader,
        format!("{}/requests/pending/{}", srv.base_url, leader_id),
        |b| !b["requests"].as_array().unwrap().is_empty(),
    )
    .await;
    assert_eq!(
        queue["requests"][0]["id"].as_str(),
        Some(request_id.as_str())
    );

    // Approval allocates in the same stroke.
    let res = leader
        .post(
            &client,
            format!("{}/requests/{}/approve", srv.base_url, request_id),
        )
        .json(&json!({ "prices": { "selling_price": 5000 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = agent
        .get(
            &client,
            format!(
                "{}/stock/availability/{}/{}",
                srv.base_url, agent_id, variant
            ),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let availability: serde_json::Value = res.json().await.unwrap();
    assert_eq!(availability["total"], 10);
}

#[tokio::test]
async fn networks_do_not_see_each_other() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (admin_a, leader_a, _) = seeded_chain(&client, &srv).await;
    let (admin_b, _, _) = seeded_chain(&client, &srv).await;

    let variant = uuid::Uuid::now_v7().to_string();

    let res = admin_a
        .post(&client, format!("{}/stock/receive", srv.base_url))
        .json(&json!({
            "variant_id": variant,
            "quantity": 100,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin_a
        .post(&client, format!("{}/stock/allocate", srv.base_url))
        .json(&json!({
            "parent": admin_a.actor,
            "child": leader_a,
            "variant_id": variant,
            "quantity": 40,
            "prices": { "dealer_price": 4500, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Network A sees its rows.
    let body = get_json_until(
        &client,
        &admin_a,
        format!("{}/stock/positions/{}", srv.base_url, leader_a),
        |b| !b["positions"].as_array().unwrap().is_empty(),
    )
    .await;
    assert_eq!(body["positions"][0]["quantity"], 40);

    // Network B sees nothing of A, even asking for A's custodian.
    let res = admin_b
        .get(
            &client,
            format!("{}/stock/positions/{}", srv.base_url, leader_a),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["positions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn catalog_brand_and_variant_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (admin, _leader, _agent) = seeded_chain(&client, &srv).await;

    // Register a brand.
    let res = admin
        .post(&client, format!("{}/catalog/brands", srv.base_url))
        .json(&json!({ "name": "Copper Kettle" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let brand_id = body["id"].as_str().unwrap().to_string();

    // Register a variant under it with default prices.
    let res = admin
        .post(&client, format!("{}/catalog/variants", srv.base_url))
        .json(&json!({
            "brand_id": brand_id,
            "name": "Kettle 1.5L",
            "prices": { "unit_cost": 3000, "selling_price": 5000 },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let variant_id = body["id"].as_str().unwrap().to_string();

    // Rename and reprice; reads go straight to the rehydrated aggregate.
    let res = admin
        .post(
            &client,
            format!("{}/catalog/variants/{}/rename", srv.base_url, variant_id),
        )
        .json(&json!({ "name": "Kettle 1.5L Steel" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .post(
            &client,
            format!("{}/catalog/variants/{}/prices", srv.base_url, variant_id),
        )
        .json(&json!({ "prices": { "unit_cost": 3000, "dealer_price": 4200, "selling_price": 5200 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .get(
            &client,
            format!("{}/catalog/variants/{}", srv.base_url, variant_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Kettle 1.5L Steel");
    assert_eq!(body["brand_id"], brand_id);
    assert_eq!(body["prices"]["dealer_price"], 4200);

    // A brand belonging to another network is invisible.
    let stranger = Session::new(NetworkId::new(), CustodianId::new());
    let res = stranger
        .get(
            &client,
            format!("{}/catalog/brands/{}", srv.base_url, brand_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
