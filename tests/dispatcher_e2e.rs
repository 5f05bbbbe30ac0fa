//! End-to-end exercises of the dispatcher against an in-memory
//! transport, standing in for the real UDP socket (spec.md §8
//! "End-to-end scenarios"). No actual network I/O happens here: a
//! `LoopbackTransport` hands whatever the dispatcher sends straight to
//! a test-driven "agent" closure, which builds its reply with the same
//! engine/security-model plumbing and feeds it back through
//! `Dispatcher::receive_message`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use snmp_engine::config::EngineConfig;
use snmp_engine::core::{Dispatcher, ResolvedTarget, SnmpEngine};
use snmp_engine::message::SecurityLevel;
use snmp_engine::pdu::{ErrorStatus, Oid, Pdu, PduType, SnmpValue, VarBind};
use snmp_engine::security::usm::crypto::AuthProtocol;
use snmp_engine::security::community::CommunityEntry;
use snmp_engine::security::{SECURITY_MODEL_USM, SECURITY_MODEL_V2C};
use snmp_engine::transport::{RecvCallback, TimerCallback, TransportDispatcher};
use snmp_engine::Result;

/// A transport whose `send_message` hands the wire bytes to a channel
/// instead of a socket, so the test can act as "the network" and
/// decide which datagrams actually arrive.
struct LoopbackTransport {
    sent: mpsc::UnboundedSender<Vec<u8>>,
    drop_first_n: AtomicU32,
}

impl LoopbackTransport {
    fn new(drop_first_n: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sent: tx,
                drop_first_n: AtomicU32::new(drop_first_n),
            }),
            rx,
        )
    }
}

#[async_trait]
impl TransportDispatcher for LoopbackTransport {
    fn register_recv_callback(&self, _callback: RecvCallback) {}
    fn register_timer_callback(&self, _callback: TimerCallback) {}

    async fn send_message(&self, _transport_domain: &str, _destination: SocketAddr, wire_bytes: Vec<u8>) -> Result<()> {
        if self.drop_first_n.load(Ordering::SeqCst) > 0 {
            self.drop_first_n.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }
        let _ = self.sent.send(wire_bytes);
        Ok(())
    }

    async fn run_dispatcher(self: Arc<Self>) {}
    async fn shutdown(&self) {}
}

fn test_target(
    engine: &SnmpEngine,
    mp_model: i32,
    security_model_id: i32,
    security_name: &str,
    security_level: SecurityLevel,
    timeout: Duration,
    retries: u32,
) -> ResolvedTarget {
    ResolvedTarget {
        target_key: "a1".to_string(),
        mp_model,
        mp: engine.message_processing_model(mp_model).unwrap(),
        security_model: engine.security_model(security_model_id).unwrap(),
        security_name: security_name.to_string(),
        security_level,
        transport_domain: "udp".to_string(),
        transport_address: "127.0.0.1:161".parse().unwrap(),
        msg_max_size: 65507,
        timeout,
        retries,
    }
}

fn sys_descr_get() -> Pdu {
    Pdu::new(
        PduType::GetRequest,
        0,
        vec![VarBind::new(
            Oid::from_string("1.3.6.1.2.1.1.1.0").unwrap(),
            SnmpValue::Null,
        )],
    )
}

/// Decodes a request datagram, builds a matching Response PDU carrying
/// `sys_descr`, and re-encodes it through the same Message Processing
/// Model and (for v2c) community table / (for v3) USM user the
/// request was built with — playing the role of the remote agent.
fn respond_v2c(engine: &SnmpEngine, request_wire: &[u8], sys_descr: &str) -> Vec<u8> {
    let mp = engine.message_processing_model(snmp_engine::mp::MP_MODEL_V2C).unwrap();
    let elements = mp.prepare_data_elements(request_wire).unwrap();

    let response_pdu = Pdu::new(
        PduType::Response,
        elements.pdu.request_id,
        vec![VarBind::new(
            elements.pdu.var_binds[0].oid.clone(),
            SnmpValue::OctetString(sys_descr.as_bytes().to_vec()),
        )],
    );

    let request = snmp_engine::mp::OutgoingMessageRequest {
        target_key: "agent",
        security_model: engine.security_model(SECURITY_MODEL_V2C).unwrap(),
        security_name: &elements.security_name,
        security_level: SecurityLevel::NoAuthNoPriv,
        context_engine_id: &elements.context_engine_id,
        context_name: &elements.context_name,
        pdu: response_pdu,
        msg_max_size: 65507,
        authoritative_engine_boots: 0,
        authoritative_engine_time: 0,
    };
    mp.prepare_outgoing_message(&request).unwrap().wire_bytes
}

#[tokio::test]
async fn v2c_get_round_trips_a_single_varbind() {
    let config = EngineConfig::default_config();
    let engine = Arc::new(SnmpEngine::new(&config).unwrap());
    engine.community_table().add(CommunityEntry {
        community: "public".to_string(),
        security_name: "public".to_string(),
        context_engine_id: Vec::new(),
        context_name: Vec::new(),
        tag_list: String::new(),
    });

    let dispatcher = Arc::new(Dispatcher::new());
    let (transport, mut sent) = LoopbackTransport::new(0);
    dispatcher.bind_transport(transport).await;

    let target = test_target(
        &engine,
        snmp_engine::mp::MP_MODEL_V2C,
        SECURITY_MODEL_V2C,
        "public",
        SecurityLevel::NoAuthNoPriv,
        Duration::from_millis(200),
        2,
    );

    let (_handle, rx) = dispatcher
        .send_pdu(&engine, target, Vec::new(), Vec::new(), sys_descr_get(), true)
        .await
        .unwrap();

    let request_wire = sent.recv().await.expect("request datagram");
    let response_wire = respond_v2c(&engine, &request_wire, "redfire test agent");
    dispatcher.receive_message(&engine, "udp", &response_wire).await;

    let response = rx.await.unwrap();
    assert!(response.error_indication.is_none());
    assert_eq!(response.error_status, ErrorStatus::NoError);
    assert_eq!(response.var_binds.len(), 1);
    assert_eq!(
        response.var_binds[0].value,
        SnmpValue::OctetString(b"redfire test agent".to_vec())
    );
}

#[tokio::test]
async fn retransmission_succeeds_after_dropped_datagrams() {
    let config = EngineConfig::default_config();
    let engine = Arc::new(SnmpEngine::new(&config).unwrap());
    engine.community_table().add(CommunityEntry {
        community: "public".to_string(),
        security_name: "public".to_string(),
        context_engine_id: Vec::new(),
        context_name: Vec::new(),
        tag_list: String::new(),
    });

    let dispatcher = Arc::new(Dispatcher::new());
    // Drop the first two attempts' sends from ever reaching "the
    // agent"; the third (after two retries) gets through.
    let (transport, mut sent) = LoopbackTransport::new(2);
    dispatcher.bind_transport(transport).await;

    let target = test_target(
        &engine,
        snmp_engine::mp::MP_MODEL_V2C,
        SECURITY_MODEL_V2C,
        "public",
        SecurityLevel::NoAuthNoPriv,
        Duration::from_millis(20),
        5,
    );

    let (_handle, rx) = dispatcher
        .send_pdu(&engine, target, Vec::new(), Vec::new(), sys_descr_get(), true)
        .await
        .unwrap();

    // Tick the timer a few times to exhaust the two dropped attempts.
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        dispatcher.receive_timer_tick(&engine, std::time::Instant::now()).await;
        if let Ok(wire) = sent.try_recv() {
            let response_wire = respond_v2c(&engine, &wire, "agent after retry");
            dispatcher.receive_message(&engine, "udp", &response_wire).await;
            break;
        }
    }

    let response = tokio::time::timeout(Duration::from_millis(500), rx)
        .await
        .expect("callback should fire")
        .unwrap();
    assert!(response.error_indication.is_none());
    assert_eq!(
        response.var_binds[0].value,
        SnmpValue::OctetString(b"agent after retry".to_vec())
    );
}

#[tokio::test]
async fn exhausted_retries_deliver_request_timed_out() {
    let config = EngineConfig::default_config();
    let engine = Arc::new(SnmpEngine::new(&config).unwrap());
    engine.community_table().add(CommunityEntry {
        community: "public".to_string(),
        security_name: "public".to_string(),
        context_engine_id: Vec::new(),
        context_name: Vec::new(),
        tag_list: String::new(),
    });

    let dispatcher = Arc::new(Dispatcher::new());
    let (transport, _sent) = LoopbackTransport::new(0);
    dispatcher.bind_transport(transport).await;

    let target = test_target(
        &engine,
        snmp_engine::mp::MP_MODEL_V2C,
        SECURITY_MODEL_V2C,
        "public",
        SecurityLevel::NoAuthNoPriv,
        Duration::from_millis(10),
        1,
    );

    let (_handle, rx) = dispatcher
        .send_pdu(&engine, target, Vec::new(), Vec::new(), sys_descr_get(), true)
        .await
        .unwrap();

    // No agent ever answers; two timer ticks exhaust the single retry.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(15)).await;
        dispatcher.receive_timer_tick(&engine, std::time::Instant::now()).await;
    }

    let response = tokio::time::timeout(Duration::from_millis(200), rx)
        .await
        .expect("callback should fire")
        .unwrap();
    assert_eq!(
        response.error_indication,
        Some(snmp_engine::core::ErrorIndication::RequestTimedOut)
    );
}

#[tokio::test]
async fn v3_discovery_handshake_precedes_the_real_request() {
    let config = EngineConfig::default_config();
    let engine = Arc::new(SnmpEngine::new(&config).unwrap());

    let remote_engine_id = b"\x80\x00\x1f\x88\x04remote-agent".to_vec();
    engine
        .usm_users()
        .add(
            &remote_engine_id,
            "monitor",
            Some(AuthProtocol::HmacSha1),
            Some(b"authpassword"),
            None,
            None,
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
    // The unauthenticated discovery Report carries userName "" against
    // an engineID we don't know yet (spec.md §4.3 step 4); USM's
    // incoming path skips the user-table lookup entirely for
    // noAuthNoPriv messages, so no anonymous user needs pre-registering
    // for the Report to process.
    let dispatcher = Arc::new(Dispatcher::new());
    let (transport, mut sent) = LoopbackTransport::new(0);
    dispatcher.bind_transport(transport).await;

    let target = test_target(
        &engine,
        snmp_engine::mp::MP_MODEL_V3,
        SECURITY_MODEL_USM,
        "monitor",
        SecurityLevel::AuthNoPriv,
        Duration::from_millis(200),
        2,
    );

    let (_handle, rx) = dispatcher
        .send_pdu(&engine, target, Vec::new(), Vec::new(), sys_descr_get(), true)
        .await
        .unwrap();

    // First datagram: the unauthenticated discovery probe.
    let discovery_wire = sent.recv().await.expect("discovery probe");
    let probe = snmp_engine::message::SnmpMessage::decode(&discovery_wire).unwrap();
    let discovery_msg_id = match &probe {
        snmp_engine::message::SnmpMessage::V3 { msg_global_data, scoped_pdu, .. } => {
            assert_eq!(msg_global_data.msg_flags, snmp_engine::message::FLAG_REPORTABLE);
            assert_eq!(scoped_pdu.as_ref().unwrap().pdu.pdu_type, PduType::Report);
            msg_global_data.msg_id
        }
        _ => panic!("expected a v3 message"),
    };

    // Agent's Report carrying its engineID/boots/time.
    let report_wire = {
        let sec_params = snmp_engine::security::usm::UsmSecurityParameters {
            msg_authoritative_engine_id: remote_engine_id.clone(),
            msg_authoritative_engine_boots: 7,
            msg_authoritative_engine_time: 1234,
            msg_user_name: String::new(),
            msg_authentication_parameters: Vec::new(),
            msg_privacy_parameters: Vec::new(),
        };
        let msg = snmp_engine::message::SnmpMessage::V3 {
            msg_global_data: snmp_engine::message::MsgGlobalData {
                msg_id: discovery_msg_id,
                msg_max_size: 65507,
                msg_flags: 0,
                msg_security_model: SECURITY_MODEL_USM,
            },
            msg_security_parameters: snmp_engine::security::usm::encode_usm_security_parameters(&sec_params),
            scoped_pdu: Some(snmp_engine::message::ScopedPdu {
                context_engine_id: Vec::new(),
                context_name: Vec::new(),
                pdu: Pdu::new(PduType::Report, 0, Vec::new()),
            }),
            encrypted_pdu: None,
        };
        msg.encode().unwrap()
    };
    dispatcher.receive_message(&engine, "udp", &report_wire).await;

    // Second datagram: the real GET, now carrying the learned engineID
    // and a distinct msgID from the discovery probe.
    let real_request_wire = sent.recv().await.expect("queued request sent after discovery");
    let real_request = snmp_engine::message::SnmpMessage::decode(&real_request_wire).unwrap();
    match real_request {
        snmp_engine::message::SnmpMessage::V3 { msg_global_data, .. } => {
            assert_ne!(msg_global_data.msg_id, discovery_msg_id);
        }
        _ => panic!("expected a v3 message"),
    }

    // Agent answers the real GET authenticated with the same user.
    let response_wire = {
        let mp = engine.message_processing_model(snmp_engine::mp::MP_MODEL_V3).unwrap();
        let elements = mp.prepare_data_elements(&real_request_wire).unwrap();
        let response_pdu = Pdu::new(
            PduType::Response,
            elements.pdu.request_id,
            vec![VarBind::new(
                elements.pdu.var_binds[0].oid.clone(),
                SnmpValue::OctetString(b"v3 agent".to_vec()),
            )],
        );
        let request = snmp_engine::mp::OutgoingMessageRequest {
            target_key: "agent",
            security_model: engine.security_model(SECURITY_MODEL_USM).unwrap(),
            security_name: "monitor",
            security_level: SecurityLevel::AuthNoPriv,
            context_engine_id: &remote_engine_id,
            context_name: &[],
            pdu: response_pdu,
            msg_max_size: 65507,
            authoritative_engine_boots: 7,
            authoritative_engine_time: 1234,
        };
        mp.prepare_outgoing_message(&request).unwrap().wire_bytes
    };
    dispatcher.receive_message(&engine, "udp", &response_wire).await;

    let response = tokio::time::timeout(Duration::from_millis(200), rx)
        .await
        .expect("callback should fire")
        .unwrap();
    assert!(response.error_indication.is_none());
    assert_eq!(
        response.var_binds[0].value,
        SnmpValue::OctetString(b"v3 agent".to_vec())
    );
}
