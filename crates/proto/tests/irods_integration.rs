//! Integration tests against a scripted mock iRODS server.
//!
//! The mock speaks the framed protocol over real sockets: startup pack,
//! optional client-server negotiation, native authentication, a small
//! data-object store, general queries, and portal (parallel) transfers.

use base64::Engine;
use rods_platform::RodsError;
use rods_proto::irods::account::{Account, AuthScheme, CsNegPolicy};
use rods_proto::irods::auth::generate_auth_response;
use rods_proto::irods::common;
use rods_proto::irods::connection::{Connection, ConnectionConfig};
use rods_proto::irods::message::{Header, Message, MessageType};
use rods_proto::irods::messages::collection::CollectionRequest;
use rods_proto::irods::messages::data_object::OpenMode;
use rods_proto::irods::messages::EmptyResponse;
use rods_proto::irods::ops::{data_object, user};
use rods_proto::irods::session::{Session, SessionConfig};
use rods_proto::irods::transfer::{self, TransferOptions};
use rods_proto::irods::xml::{XmlEra, XmlNode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const MOCK_PASSWORD: &str = "rods";
const MOCK_CHALLENGE: [u8; 64] = [5u8; 64];

#[derive(Default)]
struct MockBehavior {
    /// Server-side negotiation policy token; `None` answers the startup
    /// pack with the version directly even when the client negotiates.
    negotiation_policy: Option<&'static str>,
    /// Index of a portal data connection to drop right after its cookie.
    sabotage_chunk: Option<usize>,
}

struct MockState {
    behavior: MockBehavior,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    next_descriptor: AtomicI32,
    api_calls: Mutex<Vec<i32>>,
    connections_accepted: AtomicUsize,
    /// Receivers that resolve when an in-flight put portal has assembled
    /// its object; `OPR_COMPLETE` drains them before replying.
    portal_done: Mutex<Vec<tokio::sync::oneshot::Receiver<()>>>,
}

struct MockServer {
    port: u16,
    state: Arc<MockState>,
}

impl MockServer {
    async fn start(behavior: MockBehavior) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(MockState {
            behavior,
            objects: Mutex::new(HashMap::new()),
            next_descriptor: AtomicI32::new(3),
            api_calls: Mutex::new(Vec::new()),
            connections_accepted: AtomicUsize::new(0),
            portal_done: Mutex::new(Vec::new()),
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                accept_state
                    .connections_accepted
                    .fetch_add(1, Ordering::SeqCst);
                let conn_state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = serve_connection(socket, conn_state).await;
                });
            }
        });

        MockServer { port, state }
    }

    fn account(&self) -> Account {
        Account::new("127.0.0.1", self.port, "tempZone", "rods", MOCK_PASSWORD)
    }

    fn api_calls(&self) -> Vec<i32> {
        self.state.api_calls.lock().unwrap().clone()
    }

    fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().unwrap().get(path).cloned()
    }
}

async fn read_frame(socket: &mut TcpStream) -> Option<Message> {
    let mut len_buf = [0u8; 4];
    socket.read_exact(&mut len_buf).await.ok()?;
    let header_len = u32::from_be_bytes(len_buf) as usize;
    let mut header_buf = vec![0u8; header_len];
    socket.read_exact(&mut header_buf).await.ok()?;
    let header = Header::from_body_bytes(&header_buf).ok()?;

    let mut message = vec![0u8; header.msg_len as usize];
    socket.read_exact(&mut message).await.ok()?;
    let mut error = vec![0u8; header.error_len as usize];
    socket.read_exact(&mut error).await.ok()?;
    let mut bs = vec![0u8; header.bs_len as usize];
    socket.read_exact(&mut bs).await.ok()?;

    Some(Message::with_segments(
        header.msg_type,
        message,
        error,
        bs,
        header.int_info,
    ))
}

async fn write_frame(
    socket: &mut TcpStream,
    msg_type: MessageType,
    body: Vec<u8>,
    bs: Vec<u8>,
    int_info: i32,
) {
    let message = Message::with_segments(msg_type, body, Vec::new(), bs, int_info);
    socket.write_all(&message.to_bytes()).await.unwrap();
}

async fn write_version(socket: &mut TcpStream) {
    let body = b"<Version_PI><status>0</status><relVersion>rods4.3.0</relVersion><apiVersion>d</apiVersion><reconnPort>0</reconnPort><reconnAddr></reconnAddr><cookie>400</cookie></Version_PI>".to_vec();
    write_frame(socket, MessageType::Version, body, Vec::new(), 0).await;
}

async fn serve_connection(mut socket: TcpStream, state: Arc<MockState>) -> Option<()> {
    // Startup pack, optionally followed by negotiation.
    let startup = read_frame(&mut socket).await?;
    assert_eq!(startup.header.msg_type, MessageType::Connect);
    let startup_node = XmlNode::parse(&startup.body.message, XmlEra::Legacy).unwrap();
    let negotiate = startup_node
        .opt_text_of("option")
        .is_some_and(|o| o.contains("request_server_negotiation"));

    match (negotiate, state.behavior.negotiation_policy) {
        (true, Some(policy)) => {
            let body = format!(
                "<CS_NEG_PI><status>1</status><result>{}</result></CS_NEG_PI>",
                policy
            );
            write_frame(
                &mut socket,
                MessageType::CsNeg,
                body.into_bytes(),
                Vec::new(),
                0,
            )
            .await;
            // The client aborts without replying when the policies clash.
            let reply = read_frame(&mut socket).await?;
            assert_eq!(reply.header.msg_type, MessageType::CsNeg);
            let node = XmlNode::parse(&reply.body.message, XmlEra::Legacy).unwrap();
            assert_eq!(node.text_of("result").unwrap(), "CS_NEG_USE_TCP");
            write_version(&mut socket).await;
        }
        _ => write_version(&mut socket).await,
    }

    // Native authentication.
    let auth_request = read_frame(&mut socket).await?;
    assert_eq!(auth_request.body.int_info, common::AUTH_REQUEST_AN);
    state.api_calls.lock().unwrap().push(common::AUTH_REQUEST_AN);
    let challenge = base64::engine::general_purpose::STANDARD.encode(MOCK_CHALLENGE);
    let body = format!(
        "<authRequestOut_PI><challenge>{}</challenge></authRequestOut_PI>",
        challenge
    );
    write_frame(
        &mut socket,
        MessageType::ApiReply,
        body.into_bytes(),
        Vec::new(),
        0,
    )
    .await;

    let auth_response = read_frame(&mut socket).await?;
    assert_eq!(auth_response.body.int_info, common::AUTH_RESPONSE_AN);
    state.api_calls.lock().unwrap().push(common::AUTH_RESPONSE_AN);
    let node = XmlNode::parse(&auth_response.body.message, XmlEra::Standard).unwrap();
    let expected = generate_auth_response(&MOCK_CHALLENGE, MOCK_PASSWORD).unwrap();
    let result = if node.text_of("response").unwrap() == expected {
        0
    } else {
        -826000
    };
    write_frame(&mut socket, MessageType::ApiReply, Vec::new(), Vec::new(), result).await;
    if result < 0 {
        return Some(());
    }

    // Descriptor table for this connection.
    let mut handles: HashMap<i32, (String, usize)> = HashMap::new();

    loop {
        let frame = read_frame(&mut socket).await?;
        if frame.header.msg_type == MessageType::Disconnect {
            return Some(());
        }
        let api = frame.body.int_info;
        state.api_calls.lock().unwrap().push(api);
        handle_api(&mut socket, &state, &mut handles, api, frame).await?;
    }
}

async fn handle_api(
    socket: &mut TcpStream,
    state: &Arc<MockState>,
    handles: &mut HashMap<i32, (String, usize)>,
    api: i32,
    frame: Message,
) -> Option<()> {
    let era = XmlEra::Standard;
    match api {
        common::DATA_OBJ_CREATE_AN | common::DATA_OBJ_OPEN_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let path = node.text_of("objPath").unwrap().to_string();
            if api == common::DATA_OBJ_CREATE_AN {
                state.objects.lock().unwrap().insert(path.clone(), Vec::new());
            } else if !state.objects.lock().unwrap().contains_key(&path) {
                write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), -510002).await;
                return Some(());
            }
            let descriptor = state.next_descriptor.fetch_add(1, Ordering::SeqCst);
            handles.insert(descriptor, (path, 0));
            write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), descriptor).await;
        }
        common::DATA_OBJ_WRITE_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let descriptor = node.i32_of("l1descInx").unwrap();
            let (path, cursor) = handles.get_mut(&descriptor).unwrap();
            let end = *cursor + frame.body.bs.len();
            {
                let mut objects = state.objects.lock().unwrap();
                let data = objects.get_mut(path.as_str()).unwrap();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[*cursor..end].copy_from_slice(&frame.body.bs);
            }
            *cursor = end;
            write_frame(
                socket,
                MessageType::ApiReply,
                Vec::new(),
                Vec::new(),
                frame.body.bs.len() as i32,
            )
            .await;
        }
        common::DATA_OBJ_READ_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let descriptor = node.i32_of("l1descInx").unwrap();
            let len = node.i32_of("len").unwrap() as usize;
            let (path, cursor) = handles.get_mut(&descriptor).unwrap();
            let slice = {
                let objects = state.objects.lock().unwrap();
                let data = objects.get(path.as_str()).unwrap();
                let available = data.len().saturating_sub(*cursor).min(len);
                data[*cursor..*cursor + available].to_vec()
            };
            let available = slice.len();
            *cursor += available;
            write_frame(
                socket,
                MessageType::ApiReply,
                Vec::new(),
                slice,
                available as i32,
            )
            .await;
        }
        common::DATA_OBJ_LSEEK_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let descriptor = node.i32_of("l1descInx").unwrap();
            let offset = node.i64_of("offset").unwrap();
            let (_, cursor) = handles.get_mut(&descriptor).unwrap();
            *cursor = offset as usize;
            let body = format!("<fileLseekOut_PI><offset>{}</offset></fileLseekOut_PI>", offset);
            write_frame(socket, MessageType::ApiReply, body.into_bytes(), Vec::new(), 0).await;
        }
        common::DATA_OBJ_CLOSE_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            handles.remove(&node.i32_of("l1descInx").unwrap());
            write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), 0).await;
        }
        common::DATA_OBJ_TRUNCATE_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let path = node.text_of("objPath").unwrap();
            let size = node.i64_of("dataSize").unwrap() as usize;
            let found = {
                let mut objects = state.objects.lock().unwrap();
                match objects.get_mut(path) {
                    Some(data) => {
                        data.truncate(size);
                        true
                    }
                    None => false,
                }
            };
            match found {
                true => {
                    write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), 0).await;
                }
                false => {
                    write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), -510002)
                        .await;
                }
            }
        }
        common::DATA_OBJ_UNLINK_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let removed = state
                .objects
                .lock()
                .unwrap()
                .remove(node.text_of("objPath").unwrap())
                .is_some();
            let result = if removed { 0 } else { -510002 };
            write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), result).await;
        }
        common::COLL_CREATE_AN | common::RM_COLL_AN | common::MOD_AVU_METADATA_AN => {
            write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), 0).await;
        }
        common::GEN_QUERY_AN => {
            let body = String::from_utf8_lossy(&frame.body.message).to_string();
            handle_query(socket, state, &body).await;
        }
        common::DATA_OBJ_PUT_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let path = node.text_of("objPath").unwrap().to_string();
            let size = node.i64_of("dataSize").unwrap() as u64;
            let streams = node.i32_of("numThreads").unwrap().max(1) as usize;
            let descriptor = state.next_descriptor.fetch_add(1, Ordering::SeqCst);
            let port = spawn_put_portal(Arc::clone(state), path, size, streams).await;
            write_portal_reply(socket, descriptor, streams, port).await;
        }
        common::DATA_OBJ_GET_AN => {
            let node = XmlNode::parse(&frame.body.message, era).unwrap();
            let path = node.text_of("objPath").unwrap().to_string();
            let data = state.objects.lock().unwrap().get(&path).cloned().unwrap();
            let streams = node.i32_of("numThreads").unwrap().max(1) as usize;
            let descriptor = state.next_descriptor.fetch_add(1, Ordering::SeqCst);
            let port = spawn_get_portal(data, streams).await;
            write_portal_reply(socket, descriptor, streams, port).await;
        }
        common::OPR_COMPLETE_AN => {
            let pending: Vec<_> = state.portal_done.lock().unwrap().drain(..).collect();
            for done in pending {
                let _ = timeout(Duration::from_secs(5), done).await;
            }
            write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), 0).await;
        }
        other => panic!("mock server has no handler for API {}", other),
    }
    Some(())
}

async fn handle_query(socket: &mut TcpStream, state: &Arc<MockState>, body: &str) {
    if body.contains("<inx>401</inx>") {
        // Data-object stat: match a stored object whose collection and name
        // both appear in the conditions.
        let matched = state
            .objects
            .lock()
            .unwrap()
            .iter()
            .find(|(path, _)| {
                let (collection, name) = path.rsplit_once('/').unwrap();
                body.contains(collection) && body.contains(name)
            })
            .map(|(_, data)| data.len());
        match matched {
            Some(size) => {
                let reply = format!(
                    "<GenQueryOut_PI><rowCnt>1</rowCnt><attriCnt>3</attriCnt><continueInx>0</continueInx>\
<SqlResult_PI><attriInx>401</attriInx><reslen>8</reslen><value>1</value></SqlResult_PI>\
<SqlResult_PI><attriInx>407</attriInx><reslen>8</reslen><value>{}</value></SqlResult_PI>\
<SqlResult_PI><attriInx>411</attriInx><reslen>8</reslen><value>rods</value></SqlResult_PI>\
</GenQueryOut_PI>",
                    size
                );
                write_frame(socket, MessageType::ApiReply, reply.into_bytes(), Vec::new(), 0).await;
            }
            None => {
                write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), -808000).await;
            }
        }
    } else if body.contains("<inx>202</inx>") {
        // User listing, two pages to exercise continuation.
        let first_page = body.contains("<continueInx>0</continueInx>");
        let reply = if first_page {
            "<GenQueryOut_PI><rowCnt>2</rowCnt><attriCnt>3</attriCnt><continueInx>7</continueInx>\
<SqlResult_PI><attriInx>202</attriInx><reslen>8</reslen><value>alice</value><value>bob</value></SqlResult_PI>\
<SqlResult_PI><attriInx>204</attriInx><reslen>8</reslen><value>tempZone</value><value>tempZone</value></SqlResult_PI>\
<SqlResult_PI><attriInx>203</attriInx><reslen>8</reslen><value>rodsuser</value><value>rodsadmin</value></SqlResult_PI>\
</GenQueryOut_PI>"
        } else {
            "<GenQueryOut_PI><rowCnt>1</rowCnt><attriCnt>3</attriCnt><continueInx>0</continueInx>\
<SqlResult_PI><attriInx>202</attriInx><reslen>8</reslen><value>carol</value></SqlResult_PI>\
<SqlResult_PI><attriInx>204</attriInx><reslen>8</reslen><value>tempZone</value></SqlResult_PI>\
<SqlResult_PI><attriInx>203</attriInx><reslen>8</reslen><value>rodsuser</value></SqlResult_PI>\
</GenQueryOut_PI>"
        };
        write_frame(
            socket,
            MessageType::ApiReply,
            reply.as_bytes().to_vec(),
            Vec::new(),
            0,
        )
        .await;
    } else {
        write_frame(socket, MessageType::ApiReply, Vec::new(), Vec::new(), -808000).await;
    }
}

/// Chunk split mirroring the client's plan: remainder bytes go to the
/// leading chunks.
fn chunk_range(size: u64, streams: usize, index: usize) -> (u64, u64) {
    let streams = streams as u64;
    let base = size / streams;
    let remainder = size % streams;
    let index = index as u64;
    let length = base + u64::from(index < remainder);
    let offset = index * base + index.min(remainder);
    (offset, length)
}

async fn write_portal_reply(socket: &mut TcpStream, descriptor: i32, streams: usize, port: u16) {
    let mut body = format!(
        "<PortalOprOut_PI><status>0</status><l1descInx>{}</l1descInx><numThreads>{}</numThreads><chksum></chksum>",
        descriptor, streams
    );
    for index in 0..streams {
        body.push_str(&format!(
            "<PortList_PI><portNum>{}</portNum><cookie>{}</cookie><sock>0</sock><windowSize>0</windowSize><hostAddr>127.0.0.1</hostAddr></PortList_PI>",
            port,
            1000 + index
        ));
    }
    body.push_str("</PortalOprOut_PI>");
    write_frame(socket, MessageType::ApiReply, body.into_bytes(), Vec::new(), 0).await;
}

async fn spawn_put_portal(
    state: Arc<MockState>,
    path: String,
    size: u64,
    streams: usize,
) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let sabotage = state.behavior.sabotage_chunk;
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    state.portal_done.lock().unwrap().push(done_rx);

    tokio::spawn(async move {
        let buffer = Arc::new(Mutex::new(vec![0u8; size as usize]));
        let mut tasks = Vec::new();
        for _ in 0..streams {
            let Ok(Ok((mut data_socket, _))) =
                timeout(Duration::from_secs(5), listener.accept()).await
            else {
                break;
            };
            let buffer = Arc::clone(&buffer);
            tasks.push(tokio::spawn(async move {
                let mut cookie_buf = [0u8; 4];
                data_socket.read_exact(&mut cookie_buf).await.ok()?;
                let index = (i32::from_be_bytes(cookie_buf) - 1000) as usize;
                if sabotage == Some(index) {
                    return None; // drop the connection mid-transfer
                }
                let (offset, length) = chunk_range(size, streams, index);
                let mut chunk = vec![0u8; length as usize];
                data_socket.read_exact(&mut chunk).await.ok()?;
                buffer.lock().unwrap()[offset as usize..(offset + length) as usize]
                    .copy_from_slice(&chunk);
                Some(())
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
        let assembled = buffer.lock().unwrap().clone();
        state.objects.lock().unwrap().insert(path, assembled);
        let _ = done_tx.send(());
    });

    port
}

async fn spawn_get_portal(data: Vec<u8>, streams: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let size = data.len() as u64;
    let data = Arc::new(data);

    tokio::spawn(async move {
        for _ in 0..streams {
            let Ok(Ok((mut data_socket, _))) =
                timeout(Duration::from_secs(5), listener.accept()).await
            else {
                break;
            };
            let data = Arc::clone(&data);
            tokio::spawn(async move {
                let mut cookie_buf = [0u8; 4];
                data_socket.read_exact(&mut cookie_buf).await.ok()?;
                let index = (i32::from_be_bytes(cookie_buf) - 1000) as usize;
                let (offset, length) = chunk_range(size, streams, index);
                data_socket
                    .write_all(&data[offset as usize..(offset + length) as usize])
                    .await
                    .ok()?;
                data_socket.shutdown().await.ok()?;
                Some(())
            });
        }
    });

    port
}

fn test_config() -> ConnectionConfig {
    ConnectionConfig::new()
        .with_application_name("rods-test")
        .with_operation_timeout(Duration::from_secs(5))
}

async fn connected(server: &MockServer) -> Arc<Connection> {
    let conn = Arc::new(Connection::new(Arc::new(server.account()), test_config()));
    conn.connect().await.unwrap();
    conn
}

fn temp_file(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("rods-test-{}-{}", std::process::id(), name))
}

/// S1: native connect, version, disconnect.
#[tokio::test]
async fn test_native_connect_and_disconnect() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;

    assert!(conn.is_connected());
    let version = conn.server_version().await.unwrap();
    assert!(!version.release_version.is_empty());
    assert_eq!(version.release_version, "rods4.3.0");

    conn.disconnect().await;
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_cs_negotiation_resolves_to_tcp() {
    let server = MockServer::start(MockBehavior {
        negotiation_policy: Some("CS_NEG_DONT_CARE"),
        ..Default::default()
    })
    .await;

    let account = server.account().with_cs_negotiation(CsNegPolicy::RequireTcp);
    let conn = Connection::new(Arc::new(account), test_config());
    conn.connect().await.unwrap();
    assert!(conn.is_connected());
    conn.disconnect().await;
}

#[tokio::test]
async fn test_cs_negotiation_failure_aborts() {
    let server = MockServer::start(MockBehavior {
        negotiation_policy: Some("CS_NEG_REQUIRE_SSL"),
        ..Default::default()
    })
    .await;

    let account = server.account().with_cs_negotiation(CsNegPolicy::RequireTcp);
    let conn = Connection::new(Arc::new(account), test_config());
    let result = conn.connect().await;
    assert!(matches!(result, Err(RodsError::NegotiationFailed(_))));
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_wrong_password_fails_auth() {
    let server = MockServer::start(MockBehavior::default()).await;
    let account = Account::new("127.0.0.1", server.port, "tempZone", "rods", "wrong");
    let conn = Connection::new(Arc::new(account), test_config());
    let result = conn.connect().await;
    assert!(matches!(result, Err(RodsError::AuthFailed(_))));
    assert!(!conn.is_connected());
}

/// GSI is rejected with `Unsupported` after the handshake, before any
/// authentication message goes out.
#[tokio::test]
async fn test_gsi_is_rejected_as_unsupported() {
    let server = MockServer::start(MockBehavior::default()).await;
    let account = server.account().with_auth_scheme(AuthScheme::Gsi);
    let conn = Connection::new(Arc::new(account), test_config());

    let result = conn.connect().await;
    assert!(matches!(result, Err(RodsError::Unsupported(_))));
    assert!(!conn.is_connected());
    assert!(!server.api_calls().contains(&common::AUTH_REQUEST_AN));
}

/// PAM on a plain-TCP transport must fail before any PAM bytes are sent.
#[tokio::test]
async fn test_pam_without_tls_is_rejected() {
    let server = MockServer::start(MockBehavior::default()).await;
    let account = server.account().with_auth_scheme(AuthScheme::Pam);
    let conn = Connection::new(Arc::new(account), test_config());

    let result = conn.connect().await;
    assert!(matches!(result, Err(RodsError::TlsRequired)));
    assert!(!server
        .api_calls()
        .contains(&common::PAM_AUTH_REQUEST_AN));
}

/// S3 + S4: create/write/read/truncate/delete against the mock store.
#[tokio::test]
async fn test_data_object_lifecycle() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;
    let path = "/tempZone/home/rods/T";

    // Write 20 bytes, then truncate to the first 11 ("Hello World").
    let handle = data_object::create(&conn, path, None, true).await.unwrap();
    let written = handle.write(b"Hello World censored").await.unwrap();
    assert_eq!(written, 20);
    handle.close().await.unwrap();

    data_object::truncate(&conn, path, 11).await.unwrap();

    let stat = data_object::stat(&conn, path).await.unwrap();
    assert_eq!(stat.size, 11);

    // Reading past the truncated end returns the short payload, then EOF.
    let handle = data_object::open(&conn, path, OpenMode::Read).await.unwrap();
    let data = handle.read(20).await.unwrap();
    assert_eq!(data, b"Hello World");
    let eof = handle.read(20).await.unwrap();
    assert!(eof.is_empty());
    handle.close().await.unwrap();

    data_object::unlink(&conn, path, true).await.unwrap();
    let result = data_object::stat(&conn, path).await;
    assert!(matches!(result, Err(RodsError::FileNotFound(_))));

    conn.disconnect().await;
}

#[tokio::test]
async fn test_query_paging_drains_all_pages() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;

    let users = user::list(&conn).await.unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);

    conn.disconnect().await;
}

/// Two concurrent requests on one connection must serialize; interleaved
/// frames would corrupt the mock's framing and fail both.
#[tokio::test]
async fn test_requests_on_one_connection_are_serialized() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;

    let a = Arc::clone(&conn);
    let b = Arc::clone(&conn);
    let task_a = tokio::spawn(async move {
        a.request::<EmptyResponse>(&CollectionRequest::create("/tempZone/home/rods/a"))
            .await
    });
    let task_b = tokio::spawn(async move {
        b.request::<EmptyResponse>(&CollectionRequest::create("/tempZone/home/rods/b"))
            .await
    });

    task_a.await.unwrap().unwrap();
    task_b.await.unwrap().unwrap();

    let creates = server
        .api_calls()
        .iter()
        .filter(|&&api| api == common::COLL_CREATE_AN)
        .count();
    assert_eq!(creates, 2);

    conn.disconnect().await;
}

/// S6 / pool cap: with max=2 the third acquire waits until a return, and
/// the pool never opens a third connection.
#[tokio::test]
async fn test_pool_cap_blocks_third_acquire() {
    let server = MockServer::start(MockBehavior::default()).await;
    let session = Arc::new(Session::new(
        server.account(),
        SessionConfig::new()
            .with_max_connections(2)
            .with_operation_timeout(Duration::from_secs(5)),
    ));

    let first = session.acquire().await.unwrap();
    let second = session.acquire().await.unwrap();
    assert_eq!(session.stats().in_use, 2);

    let waiter_session = Arc::clone(&session);
    let waiter = tokio::spawn(async move { waiter_session.acquire().await });

    // The waiter must still be blocked while both connections are held.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    drop(first);
    let third = timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(third.is_connected());
    assert_eq!(session.stats().total, 2);

    drop(second);
    drop(third);
    session.release().await;
}

#[tokio::test]
async fn test_pool_acquire_times_out_when_exhausted() {
    let server = MockServer::start(MockBehavior::default()).await;
    let session = Session::new(
        server.account(),
        SessionConfig::new()
            .with_max_connections(1)
            .with_operation_timeout(Duration::from_millis(200)),
    );

    let held = session.acquire().await.unwrap();
    let result = session.acquire().await;
    assert!(matches!(result, Err(RodsError::PoolExhausted(_))));
    drop(held);
    session.release().await;
}

/// Pool property: a faulted connection is closed on return, never pooled.
#[tokio::test]
async fn test_pool_closes_faulted_connection_on_return() {
    let server = MockServer::start(MockBehavior::default()).await;
    let session = Session::new(
        server.account(),
        SessionConfig::new()
            .with_max_connections(2)
            .with_operation_timeout(Duration::from_secs(5)),
    );

    let mut handle = session.acquire().await.unwrap();
    handle.mark_faulted();
    drop(handle);

    assert_eq!(session.stats().total, 0);
    assert_eq!(session.stats().idle, 0);

    // A healthy handle is pooled and reused without a fresh dial.
    let handle = session.acquire().await.unwrap();
    drop(handle);
    let dials_before = server.state.connections_accepted.load(Ordering::SeqCst);
    let handle = session.acquire().await.unwrap();
    drop(handle);
    assert_eq!(
        server.state.connections_accepted.load(Ordering::SeqCst),
        dials_before
    );
    session.release().await;
}

/// S5-style: parallel upload reassembles chunks into the exact source
/// bytes, parallel download brings them back bit-identical.
#[tokio::test]
async fn test_parallel_upload_and_download_round_trip() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;
    let remote = "/tempZone/home/rods/big.bin";

    let payload: Vec<u8> = (0..2 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    let source = temp_file("parallel-src");
    tokio::fs::write(&source, &payload).await.unwrap();

    let options = TransferOptions::new().with_streams(2).with_threshold(1024);
    transfer::upload(&conn, &source, remote, &options).await.unwrap();

    let stored = server.stored(remote).unwrap();
    assert_eq!(stored.len(), payload.len());
    assert_eq!(
        Sha256::digest(&stored).as_slice(),
        Sha256::digest(&payload).as_slice()
    );

    let destination = temp_file("parallel-dst");
    transfer::download(&conn, remote, &destination, &options)
        .await
        .unwrap();
    let downloaded = tokio::fs::read(&destination).await.unwrap();
    assert_eq!(
        Sha256::digest(&downloaded).as_slice(),
        Sha256::digest(&payload).as_slice()
    );

    tokio::fs::remove_file(&source).await.ok();
    tokio::fs::remove_file(&destination).await.ok();
    conn.disconnect().await;
}

/// A failing chunk worker aborts its siblings, the shared token trips, and
/// the portal is still completed on the control connection.
#[tokio::test]
async fn test_parallel_upload_failure_aborts_all_workers() {
    let server = MockServer::start(MockBehavior {
        sabotage_chunk: Some(1),
        ..Default::default()
    })
    .await;
    let conn = connected(&server).await;
    let remote = "/tempZone/home/rods/doomed.bin";

    let payload = vec![0xA5u8; 8 * 1024 * 1024];
    let source = temp_file("sabotage-src");
    tokio::fs::write(&source, &payload).await.unwrap();

    let options = TransferOptions::new().with_streams(2).with_threshold(1024);
    let result = transfer::upload(&conn, &source, remote, &options).await;
    assert!(result.is_err());
    assert!(options.cancel.is_cancelled());

    // The control connection closed the portal operation regardless.
    assert!(server.api_calls().contains(&common::OPR_COMPLETE_AN));

    tokio::fs::remove_file(&source).await.ok();
    conn.disconnect().await;
}

#[tokio::test]
async fn test_single_stream_transfer_below_threshold() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;
    let remote = "/tempZone/home/rods/small.txt";

    let source = temp_file("small-src");
    tokio::fs::write(&source, b"Hello World").await.unwrap();

    // Threshold far above the object size forces the single-stream path.
    let options = TransferOptions::new().with_streams(4);
    transfer::upload(&conn, &source, remote, &options).await.unwrap();
    assert_eq!(server.stored(remote).unwrap(), b"Hello World");
    assert!(!server.api_calls().contains(&common::DATA_OBJ_PUT_AN));

    let destination = temp_file("small-dst");
    transfer::download(&conn, remote, &destination, &options)
        .await
        .unwrap();
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"Hello World");

    tokio::fs::remove_file(&source).await.ok();
    tokio::fs::remove_file(&destination).await.ok();
    conn.disconnect().await;
}

#[tokio::test]
async fn test_progress_callback_reaches_total() {
    let server = MockServer::start(MockBehavior::default()).await;
    let conn = connected(&server).await;
    let remote = "/tempZone/home/rods/progress.bin";

    let payload = vec![7u8; 300 * 1024];
    let source = temp_file("progress-src");
    tokio::fs::write(&source, &payload).await.unwrap();

    let seen = Arc::new(Mutex::new(0u64));
    let sink = Arc::clone(&seen);
    let options = TransferOptions::new().with_progress(Arc::new(move |done, _total| {
        *sink.lock().unwrap() = done;
    }));
    transfer::upload(&conn, &source, remote, &options).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), payload.len() as u64);

    tokio::fs::remove_file(&source).await.ok();
    conn.disconnect().await;
}
