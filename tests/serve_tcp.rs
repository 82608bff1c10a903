use mlpface::clock::InstantCounter;
use mlpface::mlp::INPUT_LEN;
use mlpface::protocol::{encode_input, Response, MSG_ERROR, MSG_READY, MSG_WAITING, RESPONSE_BYTES};
use mlpface::session::{Session, SessionConfig};
use mlpface::{Engine, Model, Precision};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn read_exact_text(stream: &mut TcpStream, text: &[u8]) {
    let mut buf = vec![0u8; text.len()];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(buf, text, "device sent {:?}", String::from_utf8_lossy(&buf));
}

#[test]
fn host_round_trip_over_tcp() {
    let model = Arc::new(Model::synthetic(99).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let device_model = model.clone();
    let device = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let config = SessionConfig {
            command_poll: Duration::from_millis(10),
            input_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        };
        let mut s = Session::new(stream, InstantCounter::default(), Engine::new(device_model), config);
        s.run().unwrap();
        s.served()
    });

    let mut host = TcpStream::connect(addr).unwrap();
    host.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    read_exact_text(&mut host, MSG_READY);

    let mut x = [0f32; INPUT_LEN];
    for (i, v) in x.iter_mut().enumerate() { *v = ((i * 7) % 13) as f32 / 6.5 - 1.0; }
    let expected = Engine::new(model).infer(Precision::Int8, &x);

    read_exact_text(&mut host, MSG_WAITING);
    host.write_all(&[Precision::Int8.opcode()]).unwrap();
    host.write_all(&encode_input(&x)).unwrap();
    let mut buf = [0u8; RESPONSE_BYTES];
    host.read_exact(&mut buf).unwrap();
    let r = Response::decode(&buf);
    assert_eq!(r.class as usize, expected);
    assert!(r.cycles >= 0);

    // A truncated block times out on the device and is reported, not served.
    read_exact_text(&mut host, MSG_WAITING);
    host.write_all(&[Precision::Float32.opcode()]).unwrap();
    host.write_all(&[0u8; 100]).unwrap();
    read_exact_text(&mut host, MSG_ERROR);
    read_exact_text(&mut host, MSG_WAITING);

    drop(host);
    assert_eq!(device.join().unwrap(), 1);
}
