use ctxmime::codec::codec_for;
use ctxmime::stream::LineReader;
use ctxmime::{Head, Parser};
use std::io::Read;

fn junk(len: usize) -> Vec<u8> {
    let mut state = 0x9e3779b9u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 8) as u8
        })
        .collect()
}

#[test]
fn uu_roundtrip_1000_bytes() -> Result<(), ctxmime::Error> {
    let payload = junk(1000);
    let head = Head::read(&mut LineReader::new(
        b"Content-disposition: attachment; filename=\"x.bin\"\n\n".as_ref(),
    ))?;
    let codec = codec_for("x-uuencode", Some(&head)).unwrap();

    let mut encoded = Vec::new();
    codec.encode(&mut payload.as_slice(), &mut encoded)?;
    assert!(encoded.starts_with(b"begin 644 x.bin\n"));
    assert!(encoded.ends_with(b"end\n"));

    let mut decoded = Vec::new();
    codec.decode(&mut encoded.as_slice(), &mut decoded)?;
    assert_eq!(decoded, payload);
    Ok(())
}

#[test]
fn uu_part_through_parser() -> Result<(), ctxmime::Error> {
    let payload = junk(500);
    let mut uu = Vec::new();
    codec_for("x-uu", None)
        .unwrap()
        .encode(&mut payload.as_slice(), &mut uu)?;

    let mut msg = b"Content-Type: multipart/mixed; boundary=b\n\
        \n\
        --b\n\
        Content-Type: application/octet-stream\n\
        Content-Transfer-Encoding: x-uuencode\n\
        \n\
        please find the file below\n\
        \n"
    .to_vec();
    msg.extend_from_slice(&uu);
    msg.extend_from_slice(b"--b--\n");

    let root = Parser::new().parse(msg.as_slice())?;
    let part = root.part(0).unwrap();
    assert_eq!(part.head().mime_encoding(), "x-uuencode");
    let mut body = Vec::new();
    part.body()
        .unwrap()
        .open_read()
        .unwrap()
        .read_to_end(&mut body)
        .unwrap();
    assert_eq!(body, payload);
    Ok(())
}

#[test]
fn uu_without_begin_fails() {
    let msg = b"Content-Type: text/plain\n\
                Content-Transfer-Encoding: x-uu\n\
                \n\
                no uu data anywhere\n";
    match Parser::new().parse(msg.as_ref()) {
        Err(ctxmime::Error::Decode { encoding, source }) => {
            assert_eq!(encoding, "x-uu");
            assert!(matches!(*source, ctxmime::Error::NoBegin));
        }
        other => panic!("expected a decode error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn uu_truncated_payload_is_kept() -> Result<(), ctxmime::Error> {
    let payload = junk(90);
    let mut uu = Vec::new();
    codec_for("x-uu", None)
        .unwrap()
        .encode(&mut payload.as_slice(), &mut uu)?;
    // Drop the end line and the last payload line
    let cut = uu.len() - "end\n".len() - 61;
    let codec = codec_for("x-uu", None).unwrap();
    let mut decoded = Vec::new();
    codec.decode(&mut &uu[0..cut], &mut decoded)?;
    assert_eq!(decoded, payload[0..45]);
    Ok(())
}
