use fake::Fake;
use fake::faker::address::en::{CityName, CountryName};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use rand::{Rng, RngCore};

/// Source of human-looking values for generated entities.
///
/// Every value is drawn from the caller's random stream so a seeded stream
/// reproduces the same values.
pub trait FakeValues: Send + Sync {
    fn full_name(&self, rng: &mut dyn RngCore) -> String;
    fn email(&self, rng: &mut dyn RngCore) -> String;
    fn city(&self, rng: &mut dyn RngCore) -> String;
    fn country(&self, rng: &mut dyn RngCore) -> String;

    /// Two uppercase letters followed by four digits.
    fn flight_number(&self, rng: &mut dyn RngCore) -> String {
        format!("{}{}", letters(rng, 2), digits(rng, 4))
    }

    fn airport_code(&self, rng: &mut dyn RngCore) -> String {
        letters(rng, 3)
    }

    fn registration(&self, rng: &mut dyn RngCore) -> String {
        format!("REG-{}", digits(rng, 4))
    }

    /// Random v4 UUID used for licence and employee numbers.
    fn document_id(&self, rng: &mut dyn RngCore) -> String {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        uuid::Uuid::from_bytes(bytes).to_string()
    }
}

/// `fake`-backed provider with English locale data.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakerValues;

impl FakeValues for FakerValues {
    fn full_name(&self, rng: &mut dyn RngCore) -> String {
        Name().fake_with_rng(rng)
    }

    fn email(&self, rng: &mut dyn RngCore) -> String {
        SafeEmail().fake_with_rng(rng)
    }

    fn city(&self, rng: &mut dyn RngCore) -> String {
        CityName().fake_with_rng(rng)
    }

    fn country(&self, rng: &mut dyn RngCore) -> String {
        CountryName().fake_with_rng(rng)
    }
}

fn letters(rng: &mut dyn RngCore, count: usize) -> String {
    (0..count)
        .map(|_| char::from(b'A' + rng.random_range(0..26_u8)))
        .collect()
}

fn digits(rng: &mut dyn RngCore, count: usize) -> String {
    (0..count)
        .map(|_| char::from(b'0' + rng.random_range(0..10_u8)))
        .collect()
}
