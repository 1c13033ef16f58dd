use log::debug;

/// 缩放策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPolicy {
    pub min_scale: f32,
    pub max_scale: f32,
    /// 双击放大到的倍数
    pub double_tap_scale: f32,
    /// 渲染过采样倍数
    pub base_render_factor: f32,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 5.0,
            double_tap_scale: 2.0,
            base_render_factor: 4.0,
        }
    }
}

impl ZoomPolicy {
    pub fn clamp(&self, scale: f32) -> f32 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

/// 当前页面的缩放和平移
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    scale: f32,
    pan: (f32, f32),
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ViewTransform {
    pub const fn identity() -> Self {
        Self {
            scale: 1.0,
            pan: (0.0, 0.0),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pan(&self) -> (f32, f32) {
        self.pan
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn reset(&mut self) {
        *self = Self::identity();
    }

    /// 捏合缩放：乘以 factor 后重新限制在策略范围内。
    /// 非法的 factor（NaN、无穷、非正数）直接忽略。
    pub fn zoom_by(&mut self, factor: f32, policy: &ZoomPolicy) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            debug!("[ViewTransform] ignore zoom factor {}", factor);
            return false;
        }
        let old = self.scale;
        self.scale = policy.clamp(self.scale * factor);
        (self.scale - old).abs() > f32::EPSILON
    }

    /// 拖动：位移除以当前缩放，手指移动同样距离时内容在屏幕上移动的距离不随缩放变化
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        self.pan.0 += dx / self.scale;
        self.pan.1 += dy / self.scale;
    }

    /// 双击在 1.0 和放大倍数之间切换，平移总是归零
    pub fn double_tap(&mut self, policy: &ZoomPolicy) {
        self.scale = if (self.scale - 1.0).abs() > f32::EPSILON {
            1.0
        } else {
            policy.clamp(policy.double_tap_scale)
        };
        self.pan = (0.0, 0.0);
    }
}

/// 当前缩放下的渲染分辨率（纯函数）
///
/// 缩小时不降低分辨率，放大时按缩放倍数提高分辨率。
pub fn target_resolution(
    natural_width: f32,
    natural_height: f32,
    scale: f32,
    base_render_factor: f32,
) -> (u32, u32) {
    let effective = if scale > 1.0 { scale } else { 1.0 };
    let factor = base_render_factor * effective;
    let width = (natural_width * factor).round().max(1.0) as u32;
    let height = (natural_height * factor).round().max(1.0) as u32;
    (width, height)
}

/// 页码导航，索引始终在 [0, page_count) 内
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageNavigator {
    index: usize,
    page_count: usize,
}

impl PageNavigator {
    pub fn new(page_count: usize) -> Self {
        Self {
            index: 0,
            page_count,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.page_count
    }

    /// 返回索引是否改变
    pub fn next(&mut self) -> bool {
        if self.has_next() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.has_previous() {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// 越界返回 None，索引保持不变
    pub fn go_to(&mut self, index: usize) -> Option<bool> {
        if index >= self.page_count {
            return None;
        }
        let changed = index != self.index;
        self.index = index;
        Some(changed)
    }
}
