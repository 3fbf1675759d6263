// Final zero pass

use super::BlockFill;

pub struct ZeroFill;

impl BlockFill for ZeroFill {
    fn fill(&mut self, buf: &mut [u8]) {
        buf.fill(0);
    }
}
