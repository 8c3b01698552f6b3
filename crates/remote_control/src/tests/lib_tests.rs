use super::*;
use serde_json::{json, Value};
use shared::{
    error::{ErrorCode, RemoteError},
    protocol::{RemoteRequest, RemoteResponse},
    surface::{CallArgs, RemoteSurface},
};
use std::thread;

#[derive(Default)]
struct StubSurface {
    calls: u32,
}

impl RemoteSurface for StubSurface {
    fn call_method(&mut self, name: &str, args: &CallArgs) -> Result<Value, RemoteError> {
        self.calls += 1;
        match name {
            "add" => {
                let a: i64 = args.get(0, "a")?;
                let b: i64 = args.get(1, "b")?;
                Ok(json!(a + b))
            }
            "fail" => Err(RemoteError::internal("stub failure")),
            other => Err(RemoteError::unknown_method(other)),
        }
    }

    fn read_attribute(&mut self, name: &str) -> Result<Value, RemoteError> {
        match name {
            "alive" => Ok(json!(true)),
            "calls" => Ok(json!(self.calls)),
            other => Err(RemoteError::unknown_attribute(other)),
        }
    }
}

#[test]
fn method_call_round_trip_consumes_one_request_and_produces_one_response() {
    let (client_queue, server_queue) = queue_pair();
    let mut client = RemoteClient::new(client_queue);
    let mut server = RemoteServer::new(server_queue);
    let mut surface = StubSurface::default();

    client
        .method_call_nowait("add", vec![json!(2), json!(3)])
        .expect("send");
    server.serve_next(&mut surface).expect("serve");

    assert_eq!(client.receive().expect("response"), json!(5));
    assert_eq!(server.served(), 1);
    assert_eq!(surface.calls, 1);
    assert!(server.try_next_request().expect("connected").is_none());
}

#[test]
fn blocking_client_and_server_thread_agree() {
    let (client_queue, server_queue) = queue_pair();
    let worker = thread::spawn(move || {
        let mut server = RemoteServer::new(server_queue);
        let mut surface = StubSurface::default();
        for _ in 0..2 {
            server.serve_next(&mut surface).expect("serve");
        }
        server.served()
    });

    let mut client = RemoteClient::new(client_queue);
    assert_eq!(
        client
            .method_call("add", vec![json!(40), json!(2)])
            .expect("add"),
        json!(42)
    );
    assert!(client.is_alive());
    assert_eq!(worker.join().expect("join"), 2);
}

#[test]
fn carried_error_is_reraised_without_desynchronising() {
    let (client_queue, server_queue) = queue_pair();
    let mut client = RemoteClient::new(client_queue);
    let mut server = RemoteServer::new(server_queue);
    let mut surface = StubSurface::default();

    client.method_call_nowait("fail", Vec::new()).expect("send");
    server.serve_next(&mut surface).expect("serve");
    match client.receive() {
        Err(RemoteCallError::Carried(err)) => assert_eq!(err.code, ErrorCode::Internal),
        other => panic!("unexpected outcome: {other:?}"),
    }

    client
        .method_call_nowait("add", vec![json!(1), json!(1)])
        .expect("send");
    server.serve_next(&mut surface).expect("serve");
    assert_eq!(client.receive().expect("response"), json!(2));
}

#[test]
fn second_request_is_refused_until_the_pending_response_is_received() {
    let (client_queue, server_queue) = queue_pair();
    let mut client = RemoteClient::new(client_queue);
    let mut server = RemoteServer::new(server_queue);
    let mut surface = StubSurface::default();

    client
        .method_call_nowait("add", vec![json!(1), json!(1)])
        .expect("send");
    assert!(matches!(
        client.method_call("add", vec![json!(100), json!(200)]),
        Err(RemoteCallError::ResponsePending)
    ));
    assert!(matches!(
        client.method_call_nowait("add", vec![json!(5), json!(5)]),
        Err(RemoteCallError::ResponsePending)
    ));

    server.serve_next(&mut surface).expect("serve");
    assert!(server.try_next_request().expect("connected").is_none());
    assert_eq!(client.receive().expect("pending response"), json!(2));

    client
        .method_call_nowait("add", vec![json!(100), json!(200)])
        .expect("send after receive");
    server.serve_next(&mut surface).expect("serve");
    assert_eq!(client.receive().expect("response"), json!(300));
    assert_eq!(surface.calls, 2);
}

#[test]
fn unknown_names_are_rejected_not_forwarded() {
    let (mut raw_client, server_queue) = queue_pair();
    let mut server = RemoteServer::new(server_queue);
    let mut surface = StubSurface::default();

    raw_client
        .send_request(RemoteRequest::attribute_access("secret_field"))
        .expect("send");
    server.serve_next(&mut surface).expect("serve");
    match raw_client.recv_response().expect("response") {
        RemoteResponse::CarriedError(err) => assert_eq!(err.code, ErrorCode::UnknownAttribute),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn exit_announcement_makes_later_calls_fail_fast() {
    let (client_queue, server_queue) = queue_pair();
    let mut client = RemoteClient::new(client_queue);
    let mut server = RemoteServer::new(server_queue);

    assert!(server.announce_exit().expect("announce"));
    assert!(!server.announce_exit().expect("second announce is a no-op"));

    assert!(matches!(
        client.method_call("add", vec![json!(1), json!(2)]),
        Err(RemoteCallError::Exited)
    ));
    assert!(matches!(
        client.method_call("add", vec![json!(1), json!(2)]),
        Err(RemoteCallError::Exited)
    ));
    assert!(!client.is_alive());
    assert!(server.try_next_request().expect("connected").is_none());
}

#[test]
fn exit_while_request_in_flight_is_delivered_as_the_response() {
    let (client_queue, server_queue) = queue_pair();
    let mut client = RemoteClient::new(client_queue);
    let mut server = RemoteServer::new(server_queue);

    client
        .method_call_nowait("add", vec![json!(1), json!(2)])
        .expect("send");
    server.announce_exit().expect("announce");

    assert!(matches!(client.receive(), Err(RemoteCallError::Exited)));
    assert!(client.is_exited());
    assert!(matches!(
        client.attribute_access("alive"),
        Err(RemoteCallError::Exited)
    ));

    assert!(server.try_next_request().expect("connected").is_some());
    assert!(server.try_next_request().expect("connected").is_none());
}

#[test]
fn tcp_endpoint_reports_bound_port_and_forwards_requests() {
    let (client_queue, server_queue) = queue_pair();
    let worker = thread::spawn(move || {
        let mut server = RemoteServer::new(server_queue);
        let mut surface = StubSurface::default();
        server.serve_next(&mut surface).expect("serve add");
        server.announce_exit().expect("announce");
    });

    let requested: EndpointAddress = "tcp://127.0.0.1:0".parse().expect("address");
    let endpoint = spawn_endpoint(requested, client_queue).expect("spawn endpoint");
    let EndpointAddress::Tcp(addr) = &endpoint.address else {
        panic!("expected tcp endpoint, got {}", endpoint.address);
    };
    assert_ne!(addr.port(), 0);

    let mut client = connect(&endpoint.address).expect("connect");
    assert_eq!(
        client
            .method_call("add", vec![json!(2), json!(3)])
            .expect("add"),
        json!(5)
    );
    worker.join().expect("join");

    assert!(matches!(
        client.method_call("add", vec![json!(2), json!(3)]),
        Err(RemoteCallError::Exited)
    ));
    assert!(matches!(
        client.method_call("add", vec![json!(2), json!(3)]),
        Err(RemoteCallError::Exited)
    ));
}

#[cfg(unix)]
#[test]
fn unix_endpoint_replaces_stale_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("visualiser.sock");
    let stale = std::os::unix::net::UnixListener::bind(&path).expect("stale socket");
    drop(stale);
    assert!(path.exists());

    let (client_queue, server_queue) = queue_pair();
    let worker = thread::spawn(move || {
        let mut server = RemoteServer::new(server_queue);
        let mut surface = StubSurface::default();
        server.serve_next(&mut surface).expect("serve");
    });

    let endpoint =
        spawn_endpoint(EndpointAddress::Unix(path.clone()), client_queue).expect("spawn");
    assert_eq!(endpoint.address, EndpointAddress::Unix(path));

    let mut client = connect(&endpoint.address).expect("connect");
    assert_eq!(client.attribute_access("alive").expect("alive"), json!(true));
    worker.join().expect("join");
}

#[test]
fn endpoint_address_parsing() {
    assert_eq!(
        "127.0.0.1:9413".parse::<EndpointAddress>().expect("bare"),
        "tcp://127.0.0.1:9413".parse::<EndpointAddress>().expect("prefixed")
    );
    assert!("not-an-address".parse::<EndpointAddress>().is_err());
}
