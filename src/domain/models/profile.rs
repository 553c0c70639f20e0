// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 档案数据
///
/// 表示一次档案抓取的提取结果。每个字段的提取相互独立，
/// 页面上找不到对应元素时该字段为None，不影响其他字段。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    /// 头像图片URL
    pub profile_pic_url: Option<String>,
    /// 背景封面图片URL
    pub background_cover_image_url: Option<String>,
    /// 姓名全称
    pub full_name: Option<String>,
    /// 头衔/简介
    pub headline: Option<String>,
}

impl ProfileData {
    /// 是否所有字段都提取失败
    pub fn is_empty(&self) -> bool {
        self.profile_pic_url.is_none()
            && self.background_cover_image_url.is_none()
            && self.full_name.is_none()
            && self.headline.is_none()
    }
}
