use shared::types::ServiceIdentity;

/// Derives the service id from the identity tuple.
///
/// Every string is written as its UTF-8 bytes behind a 7-bit variable-width
/// length prefix; the port, when present, as a 4-byte little-endian integer.
/// The buffer is hashed with MD5 and rendered as 32 uppercase hex digits.
/// Field order is part of the id: reordering the writes changes every id.
pub fn compute_service_id(identity: &ServiceIdentity) -> String {
    let mut buf = Vec::with_capacity(128);

    write_str(&mut buf, &identity.hostname);
    write_str(&mut buf, &identity.endpoint);
    if let Some(port) = identity.port {
        buf.extend_from_slice(&port.to_le_bytes());
    }
    write_str(&mut buf, &identity.app_name);
    write_str(&mut buf, &identity.app_version);
    write_str(&mut buf, &identity.protocol_version);

    let digest = md5::compute(&buf);
    hex::encode_upper(digest.0)
}

fn write_str(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity() -> ServiceIdentity {
        ServiceIdentity {
            hostname: "web-01".to_string(),
            endpoint: "http://web-01/manifest".to_string(),
            port: Some(8080),
            app_name: "Shop".to_string(),
            app_version: "1.2.0".to_string(),
            protocol_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_id_deterministic() {
        let id1 = compute_service_id(&test_identity());
        let id2 = compute_service_id(&test_identity());

        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 32);
        assert!(id1
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_id_changes_with_each_field() {
        let base = compute_service_id(&test_identity());

        let mutations: Vec<Box<dyn Fn(&mut ServiceIdentity)>> = vec![
            Box::new(|i: &mut ServiceIdentity| i.hostname.push('x')),
            Box::new(|i: &mut ServiceIdentity| i.endpoint.push('x')),
            Box::new(|i: &mut ServiceIdentity| i.port = Some(9090)),
            Box::new(|i: &mut ServiceIdentity| i.port = None),
            Box::new(|i: &mut ServiceIdentity| i.app_name.push('x')),
            Box::new(|i: &mut ServiceIdentity| i.app_version.push('x')),
            Box::new(|i: &mut ServiceIdentity| i.protocol_version.push('x')),
        ];

        for mutate in mutations {
            let mut identity = test_identity();
            mutate(&mut identity);
            assert_ne!(compute_service_id(&identity), base);
        }
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        // Same concatenated text, different field boundaries
        let mut a = test_identity();
        a.app_name = "Sho".to_string();
        a.app_version = "p1.2.0".to_string();

        assert_ne!(compute_service_id(&a), compute_service_id(&test_identity()));
    }

    #[test]
    fn test_known_digest() {
        // Empty strings, no port: five zero-length prefixes
        let identity = ServiceIdentity {
            hostname: String::new(),
            endpoint: String::new(),
            port: None,
            app_name: String::new(),
            app_version: String::new(),
            protocol_version: String::new(),
        };

        let expected = hex::encode_upper(md5::compute([0u8; 5]).0);
        assert_eq!(compute_service_id(&identity), expected);
    }

    #[test]
    fn test_varint_encoding() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0x7f);
        assert_eq!(buf, vec![0x7f]);

        buf.clear();
        write_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xac, 0x02]);
    }
}
