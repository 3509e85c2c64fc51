//! Wire codec for the packed little-endian layouts
//!
//! Every field in shared memory and in handshake frames is stored
//! little-endian. Values are read as host-order bytes and swapped when
//! the host disagrees with the wire, so decoded values are always in
//! host order and encoded bytes are always in wire order.

/// Byte order of a host or of the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Order used for every field on the wire
pub const WIRE_ORDER: ByteOrder = ByteOrder::Little;

impl ByteOrder {
    /// Byte order of the machine this was compiled for
    #[inline(always)]
    pub const fn host() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }
}

/// Fixed-width value that can travel over the wire
pub trait WireValue: Copy {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Reinterpret `bytes[..SIZE]` in host order, no swapping
    fn from_host_bytes(bytes: &[u8]) -> Self;

    /// Write the host-order representation into `out[..SIZE]`
    fn write_host_bytes(self, out: &mut [u8]);

    /// Reverse the byte order of every primitive inside the value
    fn swap_order(self) -> Self;
}

macro_rules! impl_wire_int {
    ($($ty:ty),*) => {$(
        impl WireValue for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline(always)]
            fn from_host_bytes(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_ne_bytes(raw)
            }

            #[inline(always)]
            fn write_host_bytes(self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
            }

            #[inline(always)]
            fn swap_order(self) -> Self {
                self.swap_bytes()
            }
        }
    )*};
}

impl_wire_int!(u8, u16, u32, u64, i32, i64);

macro_rules! impl_wire_float {
    ($($ty:ty => $bits:ty),*) => {$(
        impl WireValue for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline(always)]
            fn from_host_bytes(bytes: &[u8]) -> Self {
                <$ty>::from_bits(<$bits>::from_host_bytes(bytes))
            }

            #[inline(always)]
            fn write_host_bytes(self, out: &mut [u8]) {
                self.to_bits().write_host_bytes(out)
            }

            #[inline(always)]
            fn swap_order(self) -> Self {
                <$ty>::from_bits(self.to_bits().swap_bytes())
            }
        }
    )*};
}

impl_wire_float!(f32 => u32, f64 => u64);

/// Codec bound to a host byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    swap: bool,
}

/// Codec for the running host
pub const NATIVE: WireCodec = WireCodec::for_host(ByteOrder::host());

impl WireCodec {
    /// Codec for a host with the given byte order
    pub const fn for_host(host: ByteOrder) -> Self {
        let swap = !matches!(
            (host, WIRE_ORDER),
            (ByteOrder::Little, ByteOrder::Little) | (ByteOrder::Big, ByteOrder::Big)
        );
        Self { swap }
    }

    /// Whether this codec swaps bytes
    #[inline(always)]
    pub fn swaps(&self) -> bool {
        self.swap
    }

    /// Decode a `T` stored in wire order at `bytes[offset..]`
    #[inline(always)]
    pub fn decode<T: WireValue>(&self, bytes: &[u8], offset: usize) -> T {
        let value = T::from_host_bytes(&bytes[offset..offset + T::SIZE]);
        if self.swap {
            value.swap_order()
        } else {
            value
        }
    }

    /// Encode `value` in wire order into `out[offset..]`
    #[inline(always)]
    pub fn encode<T: WireValue>(&self, value: T, out: &mut [u8], offset: usize) {
        let value = if self.swap { value.swap_order() } else { value };
        value.write_host_bytes(&mut out[offset..offset + T::SIZE]);
    }
}

/// Decode with the host codec
#[inline(always)]
pub fn decode<T: WireValue>(bytes: &[u8], offset: usize) -> T {
    NATIVE.decode(bytes, offset)
}

/// Encode with the host codec
#[inline(always)]
pub fn encode<T: WireValue>(value: T, out: &mut [u8], offset: usize) {
    NATIVE.encode(value, out, offset)
}
