use crate::decoder::PageInfo;
use crate::error::OpenError;

/// 文档解码能力
///
/// 打开文档只返回三种失败（需要密码 / 密码错误 / 无法读取），
/// 会话状态机依赖这个区分，不能合并。
/// 注意：由于某些底层库（如 mupdf）不是线程安全的，
/// 这里只要求解码器本身可以移动到解码线程，打开的文档句柄不要求 Send。
pub trait Decoder: Send {
    /// 从字节打开文档；`password` 为 None 表示用户还没有提供密码
    fn open_document(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Box<dyn DocumentHandle>, OpenError>;
}

/// 已打开的文档句柄，Drop 时关闭
pub trait DocumentHandle {
    /// 获取文档页数
    fn page_count(&self) -> usize;

    /// 获取页面原始尺寸（PDF 点）
    fn page_size(&self, index: usize) -> anyhow::Result<(f32, f32)>;

    /// 获取所有页面信息
    fn get_all_pages(&self) -> anyhow::Result<Vec<PageInfo>> {
        (0..self.page_count())
            .map(|index| {
                let (width, height) = self.page_size(index)?;
                Ok(PageInfo::new(index, width, height))
            })
            .collect()
    }

    /// 打开单页句柄，只在一次光栅化期间有效，Drop 时释放
    fn open_page(&self, index: usize) -> anyhow::Result<Box<dyn PageHandle + '_>>;
}

/// 单页句柄
pub trait PageHandle {
    /// 页面原始尺寸
    fn size(&self) -> (f32, f32);

    /// 把整页拉伸渲染到 width x height，返回 RGBA 像素
    fn render(&self, width: u32, height: u32) -> anyhow::Result<Vec<u8>>;
}
