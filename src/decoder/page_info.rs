/// 页面信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    pub index: usize,
    pub width: f32,
    pub height: f32,
}

impl PageInfo {
    pub fn new(index: usize, width: f32, height: f32) -> Self {
        Self {
            index,
            width,
            height,
        }
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }
}
