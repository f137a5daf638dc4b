/// 抓取结果的三态包装，向订阅者传递结果而不是抛出错误
///
/// `Error` 在有可用数据时携带最近一次的有效数据，消费者可以继续展示它。
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<D, E> {
    Success(D),
    Error { error: E, data: Option<D> },
    Loading(bool),
}

impl<D, E> Resource<D, E> {
    pub fn success(data: D) -> Self {
        Resource::Success(data)
    }

    pub fn error(error: E, data: Option<D>) -> Self {
        Resource::Error { error, data }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Resource::Error { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading(true))
    }

    /// 获取携带的数据（成功数据或错误附带的旧数据）
    pub fn data(&self) -> Option<&D> {
        match self {
            Resource::Success(data) => Some(data),
            Resource::Error { data, .. } => data.as_ref(),
            Resource::Loading(_) => None,
        }
    }

    pub fn error_ref(&self) -> Option<&E> {
        match self {
            Resource::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn map<T, F: FnOnce(D) -> T>(self, f: F) -> Resource<T, E> {
        match self {
            Resource::Success(data) => Resource::Success(f(data)),
            Resource::Error { error, data } => Resource::Error { error, data: data.map(f) },
            Resource::Loading(flag) => Resource::Loading(flag),
        }
    }
}
