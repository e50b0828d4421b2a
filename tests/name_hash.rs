use anyhow::Result;
use oorandom::Rand64;
use std::collections::HashSet;

use flashpage::consts::DEFAULT_INLINE_NAME_MAX;
use flashpage::error::PageError;
use flashpage::hash::{full_name_hash, generate_key};

fn random_name(rng: &mut Rand64, len: usize) -> Vec<u8> {
    // printable file-name alphabet
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";
    (0..len)
        .map(|_| ALPHABET[rng.rand_range(0..ALPHABET.len() as u64) as usize])
        .collect()
}

#[test]
fn deterministic_on_identical_input() -> Result<()> {
    let mut rng = Rand64::new(0xA11CE);
    for _ in 0..1000 {
        let len = 1 + rng.rand_range(0..64) as usize;
        let name = random_name(&mut rng, len);
        let a = generate_key(&name, DEFAULT_INLINE_NAME_MAX)?;
        let b = generate_key(&name.clone(), DEFAULT_INLINE_NAME_MAX)?;
        assert_eq!(a, b);
    }
    Ok(())
}

#[test]
fn same_length_names_rarely_collide() -> Result<()> {
    let mut rng = Rand64::new(0xC0FFEE);
    for len in [3usize, 8, 12, 13, 24, 64] {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        while names.len() < 5000 {
            names.insert(random_name(&mut rng, len));
        }
        for n in &names {
            keys.insert(generate_key(n, DEFAULT_INLINE_NAME_MAX)?.as_u64());
        }
        let collisions = names.len() - keys.len();
        // 5000 keys in a 64-bit space: anything beyond a handful is a defect
        assert!(collisions <= 5, "len {len}: {collisions} collisions");
    }
    Ok(())
}

#[test]
fn long_names_depend_on_head_and_tail() -> Result<()> {
    let base = b"0123456789ab_suffix_part".to_vec();
    let k = generate_key(&base, 12)?;

    let mut head = base.clone();
    head[0] = b'X';
    let kh = generate_key(&head, 12)?;
    assert_ne!(k.lo(), kh.lo());
    assert_eq!(k.hi(), kh.hi());

    let mut tail = base.clone();
    let last = tail.len() - 1;
    tail[last] = b'X';
    let kt = generate_key(&tail, 12)?;
    assert_eq!(k.lo(), kt.lo());
    assert_ne!(k.hi(), kt.hi());
    Ok(())
}

#[test]
fn inline_names_mix_adjacent_bytes() -> Result<()> {
    // "abc": hi = 3 + |b-a|*a + |c-b|*b = 3 + 0x61 + 0x62
    let k = generate_key(b"abc", 12)?;
    assert_eq!(k.hi(), 3 + 0x61 + 0x62);
    assert_eq!(k.lo(), full_name_hash(b"abc"));

    // a single byte has no pairs: hi is the length
    assert_eq!(generate_key(b"z", 12)?.hi(), 1);
    Ok(())
}

#[test]
fn key_packs_high_half_on_top() -> Result<()> {
    let k = generate_key(b"lost+found", DEFAULT_INLINE_NAME_MAX)?;
    assert_eq!(k.as_u64() >> 32, k.hi() as u64);
    assert_eq!(k.as_u64() & 0xFFFF_FFFF, k.lo() as u64);
    Ok(())
}

#[test]
fn empty_name_is_invalid() {
    for max in [0usize, 1, 12, 255] {
        assert!(matches!(
            generate_key(&[], max),
            Err(PageError::InvalidArgument(_))
        ));
    }
}
