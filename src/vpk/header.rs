use binrw::binrw;

pub const VPK_HEADER_MARKER: u32 = 0x55AA1234;
pub const VPK_MAJOR_VERSION: u16 = 2;
pub const VPK_MINOR_VERSION: u16 = 3;

#[binrw]
#[derive(Debug, Clone, Default)]
#[br(little)]
#[bw(little)]
pub struct VpkDirHeader {
    pub marker: u32,
    pub major: u16,
    pub minor: u16,
    /// Byte length of the tree section following the header, excluding any signature.
    pub directory_size: u32,
    /// Always 0; signing is not performed on write.
    pub signature_size: u32,
}

impl VpkDirHeader {
    pub const SIZE: usize = 16;

    pub fn new(directory_size: u32) -> Self {
        Self {
            marker: VPK_HEADER_MARKER,
            major: VPK_MAJOR_VERSION,
            minor: VPK_MINOR_VERSION,
            directory_size,
            signature_size: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.marker == VPK_HEADER_MARKER
            && self.major == VPK_MAJOR_VERSION
            && self.minor == VPK_MINOR_VERSION
    }

    pub fn read<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<Self, binrw::Error> {
        use binrw::BinReaderExt;
        reader.read_le()
    }

    pub fn write<W: std::io::Write + std::io::Seek>(&self, writer: &mut W) -> Result<(), binrw::Error> {
        use binrw::BinWriterExt;
        writer.write_le(self)
    }
}
