use ndimage_texel::saturated::{saturated_add, saturated_mul, saturated_sub};
use ndimage_texel::{clamp_cast, DataType, Sample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

macro_rules! unsigned_properties {
    ($($name:ident: $type:ty),*) => {
        $(
            #[test]
            fn $name() {
                let mut rng = StdRng::seed_from_u64(0x5eed);
                let max = <$type>::MAX;

                for _ in 0..10_000 {
                    let x: $type = rng.gen();
                    let y: $type = rng.gen();

                    let difference = saturated_sub(x, y);
                    if y > x {
                        assert_eq!(difference, 0, "{x} - {y}");
                    } else {
                        assert_eq!(difference, x - y);
                    }

                    let sum = saturated_add(x, y);
                    if (x as u128) + (y as u128) > max as u128 {
                        assert_eq!(sum, max, "{x} + {y}");
                    } else {
                        assert_eq!(sum, x + y);
                    }

                    let product = saturated_mul(x, y);
                    if (x as u128) * (y as u128) > max as u128 {
                        assert_eq!(product, max, "{x} * {y}");
                    } else {
                        assert_eq!(product, x * y);
                    }
                }
            }
        )*
    };
}

unsigned_properties!(
    unsigned_u8: u8,
    unsigned_u16: u16,
    unsigned_u32: u32,
    unsigned_u64: u64
);

#[test]
fn signed_results_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10_000 {
        let x: i16 = rng.gen();
        let y: i16 = rng.gen();
        let exact = i32::from(x) + i32::from(y);
        let expected = exact.clamp(i16::MIN.into(), i16::MAX.into());
        assert_eq!(i32::from(saturated_add(x, y)), expected);

        let exact = i32::from(x) - i32::from(y);
        let expected = exact.clamp(i16::MIN.into(), i16::MAX.into());
        assert_eq!(i32::from(saturated_sub(x, y)), expected);
    }
}

#[test]
fn float_to_integer_conversion_clamps() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..10_000 {
        let value: f64 = rng.gen_range(-1e6..1e6);
        let converted: i16 = clamp_cast(value);
        let expected = value.round().clamp(i16::MIN.into(), i16::MAX.into());
        assert_eq!(f64::from(converted), expected, "{value}");

        let converted: u8 = clamp_cast(value);
        assert_eq!(f64::from(converted), value.round().clamp(0.0, 255.0));
    }
}

#[test]
fn data_type_tags_agree_with_samples() {
    assert_eq!(<u8 as Sample>::DATA_TYPE.size_of(), 1);
    for ty in DataType::ALL {
        let size = ndimage_texel::dispatch!(ty, S => core::mem::size_of::<S>());
        assert_eq!(size, ty.size_of(), "{ty}");
    }
}
