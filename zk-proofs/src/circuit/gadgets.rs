//! R1CS building blocks shared by the wellness circuits.
//!
//! Every magnitude comparison goes through [`geq`], which is only sound when both operands have
//! been range-checked to the same width first. The witness builder rejects out-of-range values
//! before proving; these gadgets make sure a malicious prover cannot smuggle them in either.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::prelude::*;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use crate::constants::poseidon_config;

pub(crate) fn zero() -> FpVar<Fr> {
    FpVar::<Fr>::constant(Fr::from(0u64))
}

pub(crate) fn one() -> FpVar<Fr> {
    FpVar::<Fr>::constant(Fr::from(1u64))
}

/// Convert little-endian boolean bits into an FpVar.
pub(crate) fn bits_le_to_fp(bits_le: &[Boolean<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = zero();
    let mut coeff = one();

    for b in bits_le {
        // b ? coeff : 0
        let term = b.select(&coeff, &zero())?;
        acc += term;
        coeff += coeff.clone();
    }

    Ok(acc)
}

/// Enforce that `v` fits in `n` bits and return its `n` little-endian bits.
///
/// Only `n` bits are allocated; the reconstruction constraint makes any value `>= 2^n`
/// unsatisfiable instead of silently truncating it.
pub(crate) fn range_check(
    cs: &ConstraintSystemRef<Fr>,
    v: &FpVar<Fr>,
    n: usize,
) -> Result<Vec<Boolean<Fr>>, SynthesisError> {
    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        bits.push(Boolean::new_witness(cs.clone(), || {
            let value = v.value()?;
            Ok(value.into_bigint().get_bit(i))
        })?);
    }
    let reconstructed = bits_le_to_fp(&bits)?;
    reconstructed.enforce_equal(v)?;
    Ok(bits)
}

/// Boolean gadget: `a >= b` for two values already constrained to `n` bits.
///
/// `a - b + 2^n` lies in `[1, 2^(n+1))` and its bit `n` is set exactly when `a >= b`.
pub(crate) fn geq(
    cs: &ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<Boolean<Fr>, SynthesisError> {
    let shift = FpVar::<Fr>::constant(Fr::from(1u64 << n));
    let diff = a - b + shift;
    let bits = range_check(cs, &diff, n + 1)?;
    Ok(bits[n].clone())
}

/// `b ? 1 : 0` as a field element.
pub(crate) fn bool_to_fp(b: &Boolean<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    b.select(&one(), &zero())
}

/// Poseidon hash of `inputs` in-circuit; agrees with [`poseidon_native`].
pub(crate) fn poseidon_var(
    cs: &ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSpongeVar::<Fr>::new(cs.clone(), &cfg);
    sponge.absorb(&inputs.to_vec())?;
    let out = sponge.squeeze_field_elements(1)?;
    Ok(out[0].clone())
}

/// Native Poseidon hash; used to predict the circuit's hash outputs before proving.
pub fn poseidon_native(inputs: &[Fr]) -> Fr {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);
    sponge.absorb(&inputs.to_vec());
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    out[0]
}

/// Small field element as `u64`, or `None` if it does not fit.
pub(crate) fn fr_to_u64(x: &Fr) -> Option<u64> {
    let limbs = x.into_bigint().0;
    limbs[1..].iter().all(|l| *l == 0).then_some(limbs[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;

    fn witness(cs: &ConstraintSystemRef<Fr>, v: u64) -> FpVar<Fr> {
        FpVar::new_witness(cs.clone(), || Ok(Fr::from(v))).unwrap()
    }

    #[test]
    fn range_check_accepts_in_range_and_rejects_overflow() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let v = witness(&cs, 255);
        range_check(&cs, &v, 8).unwrap();
        assert!(cs.is_satisfied().unwrap());

        let cs = ConstraintSystem::<Fr>::new_ref();
        let v = witness(&cs, 256);
        range_check(&cs, &v, 8).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn geq_matches_native_comparison() {
        for (a, b) in [(0u64, 0u64), (10, 3), (3, 10), (255, 255), (0, 255), (255, 0)] {
            let cs = ConstraintSystem::<Fr>::new_ref();
            let av = witness(&cs, a);
            let bv = witness(&cs, b);
            range_check(&cs, &av, 8).unwrap();
            range_check(&cs, &bv, 8).unwrap();
            let ge = geq(&cs, &av, &bv, 8).unwrap();
            assert_eq!(ge.value().unwrap(), a >= b, "{a} >= {b}");
            assert!(cs.is_satisfied().unwrap());
        }
    }

    #[test]
    fn poseidon_gadget_agrees_with_native() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = [Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        let vars: Vec<_> = values.iter().map(|v| FpVar::new_witness(cs.clone(), || Ok(*v)).unwrap()).collect();
        let h = poseidon_var(&cs, &vars).unwrap();
        assert_eq!(h.value().unwrap(), poseidon_native(&values));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn fr_to_u64_rejects_large_values() {
        assert_eq!(fr_to_u64(&Fr::from(42u64)), Some(42));
        assert_eq!(fr_to_u64(&(Fr::from(0u64) - Fr::from(1u64))), None);
    }
}
