//! Decoding of DNS-SD TXT metadata.
//!
//! A TXT record is a list of byte strings of the form `key=value`. A string without `=` is a
//! boolean attribute and decodes to an empty value. Only the first occurrence of a key counts.

use std::collections::BTreeMap;

/// Splits a single TXT string into its key and raw value.
///
/// Returns `None` for empty strings and strings with an empty key.
pub fn split_entry(entry: &[u8]) -> Option<(&[u8], &[u8])> {
	let (key, value) = match entry.iter().position(|&b| b == b'=') {
		Some(eq) => (&entry[..eq], &entry[eq + 1..]),
		None => (entry, &[][..]),
	};

	if key.is_empty() {
		None
	} else {
		Some((key, value))
	}
}

/// Decodes raw TXT strings into a string map.
///
/// Entries whose key or value is not valid UTF-8 are skipped; the rest of the record is kept.
pub fn decode<I, E>(entries: I) -> BTreeMap<String, String>
where
	I: IntoIterator<Item = E>,
	E: AsRef<[u8]>,
{
	let mut txt = BTreeMap::new();

	for entry in entries {
		let Some((key, value)) = split_entry(entry.as_ref()) else {
			continue;
		};

		let (key, value) = match (std::str::from_utf8(key), std::str::from_utf8(value)) {
			(Ok(key), Ok(value)) => (key, value),
			_ => {
				debug!("Dropping TXT entry {:?} (not UTF-8)", String::from_utf8_lossy(key));
				continue;
			}
		};

		txt.entry(key.to_owned()).or_insert_with(|| value.to_owned());
	}

	txt
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_pairs_and_flags() {
		let entries: [&[u8]; 5] = [b"txtvers=1", b"rp=ipp/print", b"Color", b"=orphan", b""];
		let txt = decode(entries);

		assert_eq!(txt.len(), 3);
		assert_eq!(txt["txtvers"], "1");
		assert_eq!(txt["rp"], "ipp/print");
		assert_eq!(txt["Color"], "");
	}

	#[test]
	fn value_may_contain_equals() {
		let txt = decode([b"path=/a=b".to_vec()]);
		assert_eq!(txt["path"], "/a=b");
	}

	#[test]
	fn drops_only_invalid_entries() {
		let entries: [&[u8]; 3] = [b"good=yes", b"bad=\xff\xfe", b"\xc3\x28=value"];
		let txt = decode(entries);

		assert_eq!(txt.len(), 1);
		assert_eq!(txt["good"], "yes");
	}

	#[test]
	fn first_key_wins() {
		let entries: [&[u8]; 2] = [b"a=1", b"a=2"];
		let txt = decode(entries);
		assert_eq!(txt["a"], "1");
	}
}
